use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, unbounded};
use tracing::debug;

use crate::event::StatusEvent;

/// Unbounded FIFO carrying status events from the worker to the relay.
///
/// One queue exists per call. The consumer side stays with the relay; the
/// producer side is handed out as [`StatusSink`].
pub struct StatusQueue {
    tx: Sender<StatusEvent>,
    rx: Receiver<StatusEvent>,
}

impl StatusQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Returns a producer handle for this queue.
    pub fn sink(&self) -> StatusSink {
        StatusSink {
            tx: self.tx.clone(),
        }
    }

    /// Waits up to `timeout` for the next event.
    pub fn try_pop(&self, timeout: Duration) -> Option<StatusEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            // The queue owns a sender, so this only happens while tearing down.
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Returns the next queued event without waiting.
    pub fn pop_now(&self) -> Option<StatusEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of events waiting to be popped.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for StatusQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle for a [`StatusQueue`].
#[derive(Clone)]
pub struct StatusSink {
    tx: Sender<StatusEvent>,
}

impl StatusSink {
    /// Enqueues an event and returns whether it was queued. Never blocks.
    ///
    /// Events pushed after the relay went away (for example after a
    /// cancellation) are dropped.
    pub fn push(&self, event: StatusEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(err) => {
                debug!(kind = %err.0.kind(), "status queue closed; dropping event");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_push_order() {
        let queue = StatusQueue::new();
        let sink = queue.sink();
        sink.push(StatusEvent::tool_start("a"));
        sink.push(StatusEvent::reasoning());
        sink.push(StatusEvent::text_chunk("x"));

        let popped: Vec<_> = std::iter::from_fn(|| queue.pop_now()).collect();
        assert_eq!(
            popped,
            vec![
                StatusEvent::tool_start("a"),
                StatusEvent::reasoning(),
                StatusEvent::text_chunk("x"),
            ]
        );
    }

    #[test]
    fn try_pop_times_out_when_empty() {
        let queue = StatusQueue::new();
        let started = std::time::Instant::now();
        assert!(queue.try_pop(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn events_pushed_from_another_thread_are_all_observed() {
        let queue = StatusQueue::new();
        let sink = queue.sink();
        let producer = std::thread::spawn(move || {
            for i in 0..500 {
                sink.push(StatusEvent::text_chunk(i.to_string()));
            }
        });

        let mut seen = Vec::new();
        while seen.len() < 500 {
            if let Some(event) = queue.try_pop(Duration::from_millis(100)) {
                seen.push(event.payload().map(str::to_string));
            }
        }
        producer.join().expect("producer");
        let expected: Vec<_> = (0..500).map(|i| Some(i.to_string())).collect();
        assert_eq!(seen, expected);
        assert!(queue.is_empty());
    }

    #[test]
    fn push_after_queue_dropped_is_ignored() {
        let queue = StatusQueue::new();
        let sink = queue.sink();
        assert!(sink.push(StatusEvent::reasoning()));
        drop(queue);
        assert!(!sink.push(StatusEvent::done()));
    }
}
