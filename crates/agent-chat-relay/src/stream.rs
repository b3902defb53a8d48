use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::debug;

use crate::relay::{AbortHandle, Relay, Snapshot};

/// Async view of a [`Relay`].
///
/// The relay runs on tokio's blocking pool and forwards each snapshot over a
/// bounded channel. Dropping the stream cancels the relay.
pub struct SnapshotStream {
    call_id: uuid::Uuid,
    rx: mpsc::Receiver<Snapshot>,
    abort_handle: AbortHandle,
    last: Option<Snapshot>,
}

impl SnapshotStream {
    pub(crate) fn spawn(relay: Relay, capacity: usize, runtime: &Handle) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let call_id = relay.call_id();
        let abort_handle = relay.abort_handle();
        let forward_abort = abort_handle.clone();
        runtime.spawn_blocking(move || forward(relay, tx, forward_abort));
        Self {
            call_id,
            rx,
            abort_handle,
            last: None,
        }
    }

    pub fn call_id(&self) -> uuid::Uuid {
        self.call_id
    }

    /// Returns a handle that can cancel the relay.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    /// Waits for the next snapshot. Returns `None` once the relay has ended.
    pub async fn next_snapshot(&mut self) -> Option<Snapshot> {
        let snapshot = self.rx.recv().await;
        self.remember(snapshot.as_ref());
        snapshot
    }

    /// Drains the remaining snapshots and returns the last one.
    ///
    /// Safe to call after consuming snapshots with `next_snapshot()`.
    pub async fn finish(mut self) -> Option<Snapshot> {
        while self.next_snapshot().await.is_some() {}
        self.last.take()
    }

    fn remember(&mut self, snapshot: Option<&Snapshot>) {
        if let Some(snapshot) = snapshot {
            self.last = Some(snapshot.clone());
        }
    }
}

impl futures::Stream for SnapshotStream {
    type Item = Snapshot;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Snapshot>> {
        let this = self.get_mut();
        let polled = this.rx.poll_recv(cx);
        if let Poll::Ready(snapshot) = &polled {
            this.remember(snapshot.as_ref());
        }
        polled
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

fn forward(mut relay: Relay, tx: mpsc::Sender<Snapshot>, abort: AbortHandle) {
    let call_id = relay.call_id();
    while let Some(snapshot) = relay.next() {
        if tx.blocking_send(snapshot).is_err() && !abort.is_aborted() {
            debug!(call_id = %call_id, "snapshot receiver dropped; cancelling relay");
            abort.abort();
        }
    }
}
