//! Low-power wake scheduling.
//!
//! A wake request asks to be resumed at a fixed interval even while the host
//! is dimmed. Each firing publishes [`Notification::KeepAwake`], which keeps
//! the process from being suspended between ticks but carries no time update.

use crate::common::WakeRequestId;
use crate::events::Notification;
use parking_lot::Mutex;
use slotmap::SlotMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, trace};

pub trait WakeScheduler: Send + Sync {
    /// Registers a repeating wake-up, first firing after `start_after`.
    fn schedule_repeating(&self, start_after: Duration, interval: Duration) -> WakeRequestId;

    /// Cancels the request registered under `id`. Returns `false` if it was
    /// already gone.
    fn cancel(&self, id: WakeRequestId) -> bool;
}

struct WakeRequest {
    interval: Duration,
    task: JoinHandle<()>,
}

/// A wake scheduler driven by Tokio intervals.
pub struct TokioWakeScheduler {
    requests: Mutex<SlotMap<WakeRequestId, WakeRequest>>,
    sink: broadcast::Sender<Notification>,
}

impl TokioWakeScheduler {
    /// `sink` receives a `KeepAwake` notification on every wake-up.
    pub fn new(sink: broadcast::Sender<Notification>) -> Self {
        Self {
            requests: Mutex::new(SlotMap::with_key()),
            sink,
        }
    }

    pub fn active_requests(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn interval_of(&self, id: WakeRequestId) -> Option<Duration> {
        self.requests.lock().get(id).map(|request| request.interval)
    }
}

impl WakeScheduler for TokioWakeScheduler {
    fn schedule_repeating(&self, start_after: Duration, interval: Duration) -> WakeRequestId {
        let sink = self.sink.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + start_after, interval);
            loop {
                ticker.tick().await;
                trace!("Wake request fired.");
                sink.send(Notification::KeepAwake).ok();
            }
        });
        let id = self
            .requests
            .lock()
            .insert(WakeRequest { interval, task });
        debug!("Registered wake request {:?} every {:?}", id, interval);
        id
    }

    fn cancel(&self, id: WakeRequestId) -> bool {
        match self.requests.lock().remove(id) {
            Some(request) => {
                request.task.abort();
                debug!("Cancelled wake request {:?}", id);
                true
            }
            None => false,
        }
    }
}

impl Drop for TokioWakeScheduler {
    fn drop(&mut self) {
        for (_, request) in self.requests.get_mut().drain() {
            request.task.abort();
        }
    }
}
