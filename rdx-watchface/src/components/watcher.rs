//! Defines watchers that forward an event stream onto a dispatch queue.

use crate::dispatch::DispatchQueue;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Owns one subscription: a task that receives from a broadcast stream and
/// posts every event to the dispatch queue.
///
/// The handler itself only ever runs on the queue. Cancelling or dropping the
/// watcher stops the forwarding task and releases the receiver.
pub(crate) struct StreamWatcher {
    pub label: &'static str,
    task: JoinHandle<()>,
}

impl StreamWatcher {
    /// Spawns the forwarding task.
    pub(crate) fn spawn<E, F>(
        label: &'static str,
        mut events: broadcast::Receiver<E>,
        queue: DispatchQueue,
        handler: F,
    ) -> Self
    where
        E: Clone + Send + 'static,
        F: Fn(E) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let handler = Arc::clone(&handler);
                        if !queue.post(move || (*handler)(event)) {
                            trace!("[{}] Dispatch queue closed, watcher exiting.", label);
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("[{}] Watcher lagged, {} event(s) skipped.", label, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        Self { label, task }
    }

    pub(crate) fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for StreamWatcher {
    fn drop(&mut self) {
        self.cancel();
    }
}
