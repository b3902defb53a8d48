//! Call-scoped status relay between a long-running agent call and a chat UI.
//!
//! A [`ChatSession`] forwards each prompt to an [`AgentCall`] on a worker
//! thread. Raw callback payloads from the agent are classified by a
//! [`StatusReporter`], queued, and turned into a lazy sequence of
//! [`Snapshot`]s: one start line, a progress transcript that grows as tools
//! run and text is generated, and exactly one final answer or error.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use agent_chat_relay::prelude::*;
//!
//! # fn main() -> Result<(), RelayError> {
//! let agent = ScriptedAgent::load("script.json")?;
//! let session = ChatSession::builder().agent(Arc::new(agent)).build()?;
//!
//! for snapshot in session.relay("What is AWS Lambda?")? {
//!     println!("{snapshot}");
//! }
//! # Ok(())
//! # }
//! ```

/// Agent collaborator contract.
pub mod agent;
/// Relay knobs, chat settings and tool server files.
pub mod config;
/// Error types for collaborators, calls and the public API.
pub mod errors;
/// Status events and their display lines.
pub mod event;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Thread-safe FIFO of status events.
pub mod queue;
/// Snapshot sequence for one call.
pub mod relay;
/// Callback adapter that turns agent payloads into status events.
pub mod reporter;
/// Deterministic replay agent.
pub mod scripted;
/// Session entry point and builder.
pub mod session;
/// Async snapshot stream.
pub mod stream;
/// Tool provider seam and the stdio tool server client.
pub mod tools;
/// Background worker running one agent call.
pub mod worker;

pub use agent::{AgentCall, AgentReply, AgentRequest, EventCallback, FieldBag};
pub use config::{ChatSettings, RelayConfig, ToolServerConfig, ToolServersFile, load_dotenv};
pub use errors::{AgentError, CallFailure, RelayError, ToolProviderError};
pub use event::{StatusEvent, StatusKind};
pub use observability::init_observability;
pub use queue::{StatusQueue, StatusSink};
pub use relay::{AbortHandle, Relay, Snapshot};
pub use reporter::{RawEvent, StatusReporter};
pub use scripted::{ScriptReply, ScriptStep, ScriptedAgent};
pub use session::{ChatSession, ChatSessionBuilder};
pub use stream::SnapshotStream;
pub use tools::{SharedToolProvider, StdioToolProvider, ToolProvider, ToolScope, ToolSpec};
pub use worker::{CallOutcome, Worker};
