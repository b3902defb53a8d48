use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::errors::CallFailure;
use crate::event::StatusEvent;
use crate::queue::StatusQueue;
use crate::worker::{CallOutcome, Worker};

const STARTED_LINE: &str = "🚀 Starting...";
const CANCELLED_LINE: &str = "⏹️ Request cancelled";

/// Operation run on the worker thread for one call.
pub type CallOperation = Box<dyn FnOnce() -> Result<String, CallFailure> + Send + 'static>;

/// Handle used to cancel a relay from another thread.
///
/// Cancellation detaches the relay from its worker; the worker itself is
/// left to finish on its own.
#[derive(Clone, Default)]
pub struct AbortHandle {
    flag: Arc<AtomicBool>,
}

impl AbortHandle {
    /// Requests cancellation. Takes effect at the relay's next poll.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Text the UI should display at one point of a call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Snapshot {
    /// First snapshot of every call.
    Started(String),
    /// Status transcript accumulated so far.
    Progress(String),
    /// Final answer.
    Completed(String),
    /// User-facing error message.
    Failed(String),
    /// The caller cancelled the call.
    Cancelled(String),
}

impl Snapshot {
    pub fn text(&self) -> &str {
        match self {
            Snapshot::Started(text)
            | Snapshot::Progress(text)
            | Snapshot::Completed(text)
            | Snapshot::Failed(text)
            | Snapshot::Cancelled(text) => text,
        }
    }

    /// True for the last snapshot of a call.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Snapshot::Completed(_) | Snapshot::Failed(_) | Snapshot::Cancelled(_)
        )
    }

    pub fn into_text(self) -> String {
        match self {
            Snapshot::Started(text)
            | Snapshot::Progress(text)
            | Snapshot::Completed(text)
            | Snapshot::Failed(text)
            | Snapshot::Cancelled(text) => text,
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Relay-local de-duplication state; lives exactly as long as one call.
#[derive(Debug, Default)]
pub struct RelayState {
    last_emitted: Option<StatusEvent>,
}

impl RelayState {
    /// Records `event` and reports whether it differs from the previous one.
    fn accept(&mut self, event: &StatusEvent) -> bool {
        if self.last_emitted.as_ref() == Some(event) {
            return false;
        }
        self.last_emitted = Some(event.clone());
        true
    }
}

enum Phase {
    Pending(CallOperation),
    Running(Worker),
    Finished,
}

/// Lazy, single-pass sequence of snapshots for one call.
///
/// Nothing runs until the first call to `next()`, which starts the worker and
/// yields [`Snapshot::Started`]. The sequence ends after exactly one terminal
/// snapshot.
pub struct Relay {
    call_id: uuid::Uuid,
    config: RelayConfig,
    queue: StatusQueue,
    tools_used: Arc<Mutex<Vec<String>>>,
    abort: AbortHandle,
    state: RelayState,
    transcript: Vec<String>,
    phase: Phase,
    started_at: Option<Instant>,
}

impl Relay {
    pub(crate) fn new(
        call_id: uuid::Uuid,
        config: RelayConfig,
        queue: StatusQueue,
        tools_used: Arc<Mutex<Vec<String>>>,
        operation: CallOperation,
    ) -> Self {
        Self {
            call_id,
            config,
            queue,
            tools_used,
            abort: AbortHandle::default(),
            state: RelayState::default(),
            transcript: Vec::new(),
            phase: Phase::Pending(operation),
            started_at: None,
        }
    }

    pub fn call_id(&self) -> uuid::Uuid {
        self.call_id
    }

    /// Returns a handle that can cancel this relay.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    fn start(&mut self, operation: CallOperation) -> Snapshot {
        self.state = RelayState::default();
        self.transcript = vec![STARTED_LINE.to_string()];
        self.started_at = Some(Instant::now());

        let call_id = self.call_id;
        let worker = Worker::start(
            format!("agent-call-{call_id}"),
            operation,
            move |outcome| {
                debug!(call_id = %call_id, success = outcome.result().is_some(), "agent call finished");
            },
        );
        self.phase = Phase::Running(worker);
        info!(call_id = %call_id, "agent call started");
        Snapshot::Started(STARTED_LINE.to_string())
    }

    /// Turns a popped event into a progress snapshot, unless it repeats the
    /// previous event or has nothing to show.
    fn progress(&mut self, event: StatusEvent) -> Option<Snapshot> {
        if !self.state.accept(&event) {
            debug!(call_id = %self.call_id, kind = %event.kind(), "skipping repeated status event");
            return None;
        }
        let line = event.render()?;
        self.transcript.push(line);
        Some(Snapshot::Progress(self.transcript.join("\n")))
    }

    fn cancel(&mut self) -> Snapshot {
        if let Phase::Running(worker) = std::mem::replace(&mut self.phase, Phase::Finished) {
            worker.detach();
        }
        // Dropping the receiver makes the detached worker's sink discard.
        drop(std::mem::take(&mut self.queue));
        info!(call_id = %self.call_id, elapsed_ms = self.elapsed_ms(), "agent call cancelled");
        Snapshot::Cancelled(CANCELLED_LINE.to_string())
    }

    fn finish(&mut self, outcome: CallOutcome) -> Snapshot {
        self.phase = Phase::Finished;
        let elapsed_ms = self.elapsed_ms();
        match outcome {
            CallOutcome::Failure(failure) => {
                warn!(call_id = %self.call_id, elapsed_ms, error = %failure, "agent call failed");
                Snapshot::Failed(format!("Sorry, an error occurred: {failure}"))
            }
            CallOutcome::Success(mut text) => {
                let tools = match self.tools_used.lock() {
                    Ok(tools) => tools.clone(),
                    Err(poisoned) => poisoned.into_inner().clone(),
                };
                if self.config.tool_summary && !tools.is_empty() {
                    text.push_str(&format!("\n\n🔧 Tools used: {}", tools.join(", ")));
                }
                info!(call_id = %self.call_id, elapsed_ms, tools = tools.len(), "agent call completed");
                Snapshot::Completed(text)
            }
        }
    }

    fn elapsed_ms(&self) -> u64 {
        self.started_at
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or_default()
    }
}

impl Iterator for Relay {
    type Item = Snapshot;

    fn next(&mut self) -> Option<Snapshot> {
        loop {
            let running = match &self.phase {
                Phase::Running(worker) => worker.is_running(),
                Phase::Finished => return None,
                Phase::Pending(_) => {
                    return match std::mem::replace(&mut self.phase, Phase::Finished) {
                        Phase::Pending(operation) => Some(self.start(operation)),
                        _ => None,
                    };
                }
            };

            if self.abort.is_aborted() {
                return Some(self.cancel());
            }

            if running {
                if let Some(event) = self.queue.try_pop(self.config.poll_interval)
                    && let Some(snapshot) = self.progress(event)
                {
                    return Some(snapshot);
                }
                continue;
            }

            // The worker has signaled completion; everything it pushed is
            // already queued.
            while let Some(event) = self.queue.pop_now() {
                if let Some(snapshot) = self.progress(event) {
                    return Some(snapshot);
                }
            }

            let outcome = match &mut self.phase {
                Phase::Running(worker) => worker.join().clone(),
                _ => CallOutcome::Failure(CallFailure::Lost),
            };
            return Some(self.finish(outcome));
        }
    }
}

impl std::iter::FusedIterator for Relay {}
