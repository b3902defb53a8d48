use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::errors::CallFailure;

/// Terminal state of one worker invocation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CallOutcome {
    /// The operation returned a result.
    Success(String),
    /// The operation failed or panicked.
    Failure(CallFailure),
}

impl CallOutcome {
    pub fn result(&self) -> Option<&str> {
        match self {
            CallOutcome::Success(text) => Some(text),
            CallOutcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&CallFailure> {
        match self {
            CallOutcome::Success(_) => None,
            CallOutcome::Failure(failure) => Some(failure),
        }
    }
}

#[derive(Default)]
struct WorkerShared {
    outcome: OnceLock<CallOutcome>,
    finished: AtomicBool,
}

impl WorkerShared {
    fn record(&self, outcome: CallOutcome) -> &CallOutcome {
        self.outcome.get_or_init(|| outcome)
    }

    fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

/// Runs one long-running operation on its own thread.
///
/// The outcome is written once by the worker thread and can be read any
/// number of times after [`Worker::join`].
pub struct Worker {
    name: String,
    handle: Option<JoinHandle<()>>,
    shared: Arc<WorkerShared>,
}

impl Worker {
    /// Starts `operation` on a new thread and returns immediately.
    ///
    /// `on_done` runs on the worker thread after the outcome is recorded and
    /// before the completion flag is raised.
    pub fn start<F, D>(name: impl Into<String>, operation: F, on_done: D) -> Self
    where
        F: FnOnce() -> Result<String, CallFailure> + Send + 'static,
        D: FnOnce(&CallOutcome) + Send + 'static,
    {
        let name = name.into();
        let shared = Arc::new(WorkerShared::default());
        let thread_shared = shared.clone();

        let spawned = thread::Builder::new().name(name.clone()).spawn(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(operation)) {
                Ok(Ok(text)) => CallOutcome::Success(text),
                Ok(Err(failure)) => CallOutcome::Failure(failure),
                Err(payload) => CallOutcome::Failure(CallFailure::Panicked {
                    message: panic_message(payload.as_ref()),
                }),
            };
            let outcome = thread_shared.record(outcome);
            if panic::catch_unwind(AssertUnwindSafe(|| on_done(outcome))).is_err() {
                warn!("worker completion hook panicked");
            }
            thread_shared.finish();
        });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(err) => {
                warn!(worker = %name, error = %err, "failed to spawn worker thread");
                shared.record(CallOutcome::Failure(CallFailure::WorkerSpawn {
                    message: err.to_string(),
                }));
                shared.finish();
                None
            }
        };

        Self {
            name,
            handle,
            shared,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true until the outcome has been recorded.
    pub fn is_running(&self) -> bool {
        !self.shared.finished.load(Ordering::Acquire)
    }

    /// Returns the recorded outcome once the worker has finished.
    pub fn outcome(&self) -> Option<&CallOutcome> {
        if self.is_running() {
            return None;
        }
        self.shared.outcome.get()
    }

    /// Blocks until the worker thread has ended and returns its outcome.
    pub fn join(&mut self) -> &CallOutcome {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(worker = %self.name, "worker thread terminated abnormally");
        }
        self.shared
            .outcome
            .get_or_init(|| CallOutcome::Failure(CallFailure::Lost))
    }

    /// Stops tracking the worker without waiting for it.
    ///
    /// The thread keeps running to completion; its outcome is discarded.
    pub fn detach(mut self) {
        if self.handle.take().is_some() {
            debug!(worker = %self.name, "detached from running worker");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
