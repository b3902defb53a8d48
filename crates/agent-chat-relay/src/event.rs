use std::fmt;

/// Closed set of progress notifications relayed to the UI.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum StatusKind {
    /// The agent started invoking a tool.
    ToolStart,
    /// The agent entered a reasoning phase.
    Reasoning,
    /// A fragment of reasoning text.
    ReasoningChunk,
    /// The agent left its reasoning phase.
    ReasoningDone,
    /// A raw output token chunk.
    TextChunk,
    /// The agent reported completion.
    Done,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Normalized progress event emitted during one call.
///
/// Events are immutable once created; the relay consumes each one exactly once.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StatusEvent {
    kind: StatusKind,
    payload: Option<String>,
}

impl StatusEvent {
    pub fn tool_start(name: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::ToolStart,
            payload: Some(name.into()),
        }
    }

    pub fn reasoning() -> Self {
        Self {
            kind: StatusKind::Reasoning,
            payload: None,
        }
    }

    pub fn reasoning_chunk(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::ReasoningChunk,
            payload: Some(text.into()),
        }
    }

    pub fn reasoning_done() -> Self {
        Self {
            kind: StatusKind::ReasoningDone,
            payload: None,
        }
    }

    pub fn text_chunk(text: impl Into<String>) -> Self {
        Self {
            kind: StatusKind::TextChunk,
            payload: Some(text.into()),
        }
    }

    pub fn done() -> Self {
        Self {
            kind: StatusKind::Done,
            payload: None,
        }
    }

    pub fn kind(&self) -> StatusKind {
        self.kind
    }

    pub fn payload(&self) -> Option<&str> {
        self.payload.as_deref()
    }

    /// Renders the event as a single status line for the transcript.
    ///
    /// `Done` has no line of its own: the final answer follows it.
    pub fn render(&self) -> Option<String> {
        let payload = self.payload.as_deref().unwrap_or_default();
        match self.kind {
            StatusKind::ToolStart => Some(format!("🔧 Running tool `{payload}`...")),
            StatusKind::Reasoning => Some("🤔 Thinking...".to_string()),
            StatusKind::ReasoningChunk => Some(format!("🤔 Thinking: {payload}")),
            StatusKind::ReasoningDone => Some("💡 Finished thinking".to_string()),
            StatusKind::TextChunk => Some("✍️ Generating response...".to_string()),
            StatusKind::Done => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_start_renders_tool_name() {
        let line = StatusEvent::tool_start("calculate").render();
        assert_eq!(line.as_deref(), Some("🔧 Running tool `calculate`..."));
    }

    #[test]
    fn done_is_not_rendered() {
        assert_eq!(StatusEvent::done().render(), None);
        assert_eq!(StatusEvent::done().payload(), None);
    }

    #[test]
    fn events_compare_by_kind_and_payload() {
        assert_eq!(StatusEvent::text_chunk("a"), StatusEvent::text_chunk("a"));
        assert_ne!(StatusEvent::text_chunk("a"), StatusEvent::text_chunk("b"));
        assert_ne!(
            StatusEvent::reasoning_chunk("a"),
            StatusEvent::text_chunk("a")
        );
    }
}
