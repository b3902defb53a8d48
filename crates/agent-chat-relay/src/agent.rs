use std::fmt;

use crate::errors::AgentError;
use crate::tools::ToolSpec;

/// Loosely-typed bag of fields passed to the progress callback.
///
/// The upstream agent runtime decides what goes in here; the reporter
/// normalizes it.
pub type FieldBag = serde_json::Map<String, serde_json::Value>;

/// Progress callback handed to an agent for the duration of one call.
pub type EventCallback<'a> = dyn Fn(&FieldBag) + Send + Sync + 'a;

/// Input for a single agent call.
#[derive(Clone, Debug, PartialEq)]
pub struct AgentRequest {
    /// Id shared by every log line of this call.
    pub call_id: uuid::Uuid,
    /// User prompt.
    pub prompt: String,
    /// Tools discovered from the session's tool provider for this call.
    pub tools: Vec<ToolSpec>,
}

/// Final value returned by an agent call.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum AgentReply {
    /// Plain text answer.
    Text(String),
    /// Structured answer; rendered as JSON text before it reaches the UI.
    Json(serde_json::Value),
}

impl AgentReply {
    /// Converts the reply to the text shown to the user.
    pub fn into_text(self) -> String {
        match self {
            AgentReply::Text(text) => text,
            AgentReply::Json(value) => value.to_string(),
        }
    }
}

impl fmt::Display for AgentReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentReply::Text(text) => f.write_str(text),
            AgentReply::Json(value) => write!(f, "{value}"),
        }
    }
}

impl From<String> for AgentReply {
    fn from(value: String) -> Self {
        AgentReply::Text(value)
    }
}

impl From<&str> for AgentReply {
    fn from(value: &str) -> Self {
        AgentReply::Text(value.to_string())
    }
}

/// Opaque long-running agent invocation.
///
/// `invoke` runs on a dedicated worker thread. It may call `on_event` any
/// number of times with implementation-defined field bags, and either returns
/// the final reply or an error.
pub trait AgentCall: Send + Sync {
    /// Short name used in logs and model info.
    fn name(&self) -> &str {
        "agent"
    }

    fn invoke(
        &self,
        request: &AgentRequest,
        on_event: &EventCallback<'_>,
    ) -> Result<AgentReply, AgentError>;
}
