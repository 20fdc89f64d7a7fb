//! The self-correcting, second-aligned ticker.
//!
//! Each tick computes the delay to the next whole second of the monotonic
//! clock and re-arms itself for exactly that instant, so neither timer drift
//! nor dispatch latency accumulates.

use crate::dispatch::ScheduledJob;
use std::time::Duration;

const SECOND_MILLIS: u64 = 1_000;

/// Delay from `uptime` to the next whole second: `1000 - uptime mod 1000` ms.
///
/// Lands on the following boundary when `uptime` is already on one.
pub fn next_second_boundary(uptime: Duration) -> Duration {
    let millis = uptime.as_millis() as u64;
    Duration::from_millis(SECOND_MILLIS - millis % SECOND_MILLIS)
}

/// The one pending tick a controller may own.
///
/// The serial identifies which arming this is. A tick job that has already
/// left its timer checks the serial before acting, so cancelling the handle
/// also neutralizes a job sitting in the dispatch queue.
#[derive(Debug)]
pub(crate) struct ScheduledTick {
    pub serial: u64,
    job: ScheduledJob,
}

impl ScheduledTick {
    pub(crate) fn new(serial: u64, job: ScheduledJob) -> Self {
        Self { serial, job }
    }

    pub(crate) fn cancel(mut self) {
        self.job.cancel();
    }
}
