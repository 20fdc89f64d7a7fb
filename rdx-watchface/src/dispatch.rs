//! A serial dispatch queue, the single logical thread a controller runs on.
//!
//! Jobs posted to a [`DispatchQueue`] run one at a time, in posting order, on
//! one Tokio task. Delayed jobs wait on their own timer task and are only
//! pushed onto the queue once their deadline has passed.

use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::trace;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A cloneable handle to a serial executor.
#[derive(Clone)]
pub struct DispatchQueue {
    sender: mpsc::UnboundedSender<Job>,
}

impl DispatchQueue {
    /// Spawns the executor loop on the current Tokio runtime.
    ///
    /// The loop ends once every handle has been dropped.
    pub fn spawn() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                job();
            }
            trace!("Dispatch queue drained and closed.");
        });
        Self { sender }
    }

    /// Enqueues `job` behind everything already posted.
    ///
    /// Returns `false` if the executor loop has stopped.
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender.send(Box::new(job)).is_ok()
    }

    /// Enqueues `job` once `deadline` has passed.
    ///
    /// Cancelling the returned handle before the deadline guarantees the job
    /// never reaches the queue.
    pub fn post_at(&self, deadline: Instant, job: impl FnOnce() + Send + 'static) -> ScheduledJob {
        let queue = self.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            queue.post(job);
        });
        ScheduledJob {
            deadline,
            timer: Some(timer),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl fmt::Debug for DispatchQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A delayed job. Dropping the handle cancels it.
#[derive(Debug)]
pub struct ScheduledJob {
    deadline: Instant,
    timer: Option<JoinHandle<()>>,
}

impl ScheduledJob {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Stops the timer. A job already handed to the queue is not recalled.
    pub fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.timer.as_ref().is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for ScheduledJob {
    fn drop(&mut self) {
        self.cancel();
    }
}
