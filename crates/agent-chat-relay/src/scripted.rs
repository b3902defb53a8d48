//! Deterministic agent that replays a recorded script of callback payloads.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::agent::{AgentCall, AgentReply, AgentRequest, EventCallback, FieldBag};
use crate::errors::{AgentError, RelayError};

/// One callback invocation in a script.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScriptStep {
    /// Pause before the payload is reported.
    #[serde(default)]
    pub delay_ms: u64,
    pub fields: FieldBag,
}

/// How a script ends.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptReply {
    Text(String),
    Json(serde_json::Value),
    Error { kind: ScriptErrorKind, message: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptErrorKind {
    Upstream,
    Timeout,
}

impl ScriptReply {
    pub fn text(text: impl Into<String>) -> Self {
        ScriptReply::Text(text.into())
    }

    pub fn error_upstream(message: impl Into<String>) -> Self {
        ScriptReply::Error {
            kind: ScriptErrorKind::Upstream,
            message: message.into(),
        }
    }

    pub fn error_timeout(message: impl Into<String>) -> Self {
        ScriptReply::Error {
            kind: ScriptErrorKind::Timeout,
            message: message.into(),
        }
    }
}

/// [`AgentCall`] that reports a fixed list of payloads and then replies.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScriptedAgent {
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
    /// Pause between the last step and the reply.
    #[serde(default)]
    pub reply_delay_ms: u64,
    pub reply: ScriptReply,
}

impl ScriptedAgent {
    pub fn new(steps: Vec<ScriptStep>, reply: ScriptReply) -> Self {
        Self {
            steps,
            reply_delay_ms: 0,
            reply,
        }
    }

    /// Reads a script from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let file_error = |message: String| RelayError::ConfigFile {
            path: path.display().to_string(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|err| file_error(err.to_string()))?;
        serde_json::from_str(&raw).map_err(|err| file_error(err.to_string()))
    }
}

impl AgentCall for ScriptedAgent {
    fn name(&self) -> &str {
        "scripted"
    }

    fn invoke(
        &self,
        request: &AgentRequest,
        on_event: &EventCallback<'_>,
    ) -> Result<AgentReply, AgentError> {
        debug!(
            call_id = %request.call_id,
            steps = self.steps.len(),
            tools = request.tools.len(),
            "replaying script"
        );
        for step in &self.steps {
            if step.delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(step.delay_ms));
            }
            on_event(&step.fields);
        }
        if self.reply_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.reply_delay_ms));
        }
        match &self.reply {
            ScriptReply::Text(text) => Ok(AgentReply::Text(text.clone())),
            ScriptReply::Json(value) => Ok(AgentReply::Json(value.clone())),
            ScriptReply::Error {
                kind: ScriptErrorKind::Upstream,
                message,
            } => Err(AgentError::upstream(message.clone())),
            ScriptReply::Error {
                kind: ScriptErrorKind::Timeout,
                message,
            } => Err(AgentError::timeout(message.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn deserializes_script_file_shape() {
        let script: ScriptedAgent = serde_json::from_value(serde_json::json!({
            "steps": [
                {"delay_ms": 5, "fields": {"current_tool_use": {"name": "calculate"}}},
                {"fields": {"data": "6"}}
            ],
            "reply": {"text": "6"}
        }))
        .expect("script");
        assert_eq!(script.steps.len(), 2);
        assert_eq!(script.steps[1].delay_ms, 0);
        assert_eq!(script.reply, ScriptReply::text("6"));

        let failing: ScriptedAgent = serde_json::from_value(serde_json::json!({
            "reply": {"error": {"kind": "timeout", "message": "upstream down"}}
        }))
        .expect("script");
        assert_eq!(failing.reply, ScriptReply::error_timeout("upstream down"));
    }

    #[test]
    fn replays_steps_then_replies() {
        let script: ScriptedAgent = serde_json::from_value(serde_json::json!({
            "steps": [{"fields": {"reasoning": true}}, {"fields": {"data": "x"}}],
            "reply": {"json": {"answer": 1}}
        }))
        .expect("script");
        let seen = Mutex::new(Vec::new());
        let request = AgentRequest {
            call_id: uuid::Uuid::new_v4(),
            prompt: "p".into(),
            tools: Vec::new(),
        };
        let reply = script
            .invoke(&request, &|fields: &FieldBag| {
                seen.lock().expect("lock").push(fields.clone())
            })
            .expect("reply");
        assert_eq!(reply.into_text(), r#"{"answer":1}"#);
        assert_eq!(seen.lock().expect("lock").len(), 2);
    }

    #[test]
    fn error_replies_map_to_agent_errors() {
        let agent = ScriptedAgent::new(Vec::new(), ScriptReply::error_upstream("quota"));
        let request = AgentRequest {
            call_id: uuid::Uuid::new_v4(),
            prompt: "p".into(),
            tools: Vec::new(),
        };
        let err = agent.invoke(&request, &|_: &FieldBag| {}).err();
        assert_eq!(err, Some(AgentError::upstream("quota")));
    }
}
