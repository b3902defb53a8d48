//! Common imports for typical relay usage.
pub use crate::{
    AbortHandle, AgentCall, AgentError, AgentReply, AgentRequest, ChatSession, ChatSettings,
    EventCallback, FieldBag, RelayConfig, RelayError, ScriptedAgent, Snapshot, SnapshotStream,
    StdioToolProvider, ToolProvider, ToolSpec,
};
