//! Normalization of raw agent callback payloads into [`StatusEvent`]s.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use crate::agent::FieldBag;
use crate::event::StatusEvent;
use crate::queue::StatusSink;

const TOOL_USE_KEYS: [&str; 2] = ["current_tool_use", "tool_use"];
const TOOL_NAME_KEYS: [&str; 3] = ["name", "tool_name", "toolName"];
const UNKNOWN_TOOL: &str = "unknown";
const ELLIPSIS: char = '…';

/// Recognized shapes of a raw callback payload.
///
/// Classification follows a fixed precedence: tool invocation, then
/// reasoning, then raw tokens, then completion. Anything else is `Unknown`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawEvent {
    ToolUse { name: String },
    ReasoningText(String),
    ReasoningStarted,
    ReasoningFinished,
    Data(String),
    Complete,
    Unknown { keys: Vec<String> },
}

impl RawEvent {
    pub fn classify(fields: &FieldBag) -> Self {
        if let Some(tool) = TOOL_USE_KEYS
            .iter()
            .find_map(|key| fields.get(*key).and_then(Value::as_object))
        {
            let name = TOOL_NAME_KEYS
                .iter()
                .find_map(|key| tool.get(*key).and_then(Value::as_str))
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(UNKNOWN_TOOL);
            return RawEvent::ToolUse {
                name: name.to_string(),
            };
        }

        if let Some(text) = fields.get("reasoningText").and_then(Value::as_str) {
            return RawEvent::ReasoningText(text.to_string());
        }
        match fields.get("reasoning").and_then(Value::as_bool) {
            Some(true) => return RawEvent::ReasoningStarted,
            Some(false) => return RawEvent::ReasoningFinished,
            None => {}
        }

        if let Some(data) = fields.get("data").and_then(Value::as_str) {
            return RawEvent::Data(data.to_string());
        }

        if fields.get("complete").and_then(Value::as_bool) == Some(true) {
            return RawEvent::Complete;
        }

        RawEvent::Unknown {
            keys: fields.keys().cloned().collect(),
        }
    }
}

/// Truncates `text` to at most `max_chars` characters.
///
/// A truncated preview ends with `…`, which counts toward the bound.
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }
    let mut out: String = text.chars().take(max_chars - 1).collect();
    out.push(ELLIPSIS);
    out
}

/// Per-call callback adapter handed to the agent.
///
/// Runs inline on the worker thread, so `report` only classifies, truncates
/// and enqueues.
pub struct StatusReporter {
    call_id: uuid::Uuid,
    sink: StatusSink,
    preview_chars: usize,
    tools_used: Arc<Mutex<Vec<String>>>,
}

impl StatusReporter {
    pub fn new(call_id: uuid::Uuid, sink: StatusSink, preview_chars: usize) -> Self {
        Self {
            call_id,
            sink,
            preview_chars,
            tools_used: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Classifies one raw payload and pushes the resulting event, if any.
    pub fn report(&self, fields: &FieldBag) {
        let call_id = self.call_id;
        let event = match RawEvent::classify(fields) {
            RawEvent::ToolUse { name } => {
                debug!(call_id = %call_id, tool = %name, "tool invocation started");
                self.record_tool(&name);
                StatusEvent::tool_start(preview(&name, self.preview_chars))
            }
            RawEvent::ReasoningText(text) => {
                debug!(call_id = %call_id, reasoning = %text, "reasoning text");
                StatusEvent::reasoning_chunk(preview(&text, self.preview_chars))
            }
            RawEvent::ReasoningStarted => StatusEvent::reasoning(),
            RawEvent::ReasoningFinished => StatusEvent::reasoning_done(),
            RawEvent::Data(text) => {
                StatusEvent::text_chunk(preview(&text, self.preview_chars))
            }
            RawEvent::Complete => {
                debug!(call_id = %call_id, "agent reported completion");
                StatusEvent::done()
            }
            RawEvent::Unknown { keys } => {
                debug!(call_id = %call_id, ?keys, "ignoring unrecognized status payload");
                return;
            }
        };
        self.sink.push(event);
    }

    /// Distinct tool names reported so far, in first-use order.
    pub fn tools_used(&self) -> Vec<String> {
        match self.tools_used.lock() {
            Ok(tools) => tools.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn tools_handle(&self) -> Arc<Mutex<Vec<String>>> {
        self.tools_used.clone()
    }

    fn record_tool(&self, name: &str) {
        let mut tools = match self.tools_used.lock() {
            Ok(tools) => tools,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !tools.iter().any(|existing| existing == name) {
            tools.push(name.to_string());
        }
    }
}
