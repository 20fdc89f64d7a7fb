//! # Watchface
//!
//! A lifecycle-bound, power-aware time controller for watch face hosts.
//!
//! The crate keeps a host display surface informed of the current time, the
//! battery level and the active display format, while waking as rarely as the
//! active format allows.
//!
//! ## Core Concepts
//!
//! - **TimeController**: bound to exactly one [`host::Host`] through a weak,
//!   liveness-checked reference. It never keeps the host alive.
//! - **Attach / Detach**: attaching subscribes to the clock source's
//!   notification and settings streams, optionally registers a low-power wake
//!   request, and starts ticking. Detaching tears all of it down.
//! - **Self-correcting ticker**: when the active format shows seconds, every
//!   tick re-arms itself for the next whole second of the monotonic clock, so
//!   dispatch latency never accumulates into drift.
//! - **Format policy**: the host's 24-hour policy picks between a user 12-hour
//!   pattern, a user 24-hour pattern and the built-in locale defaults.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use watchface::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let queue = DispatchQueue::spawn();
//!     let clock = Arc::new(SystemClock::new(chrono_tz::UTC));
//!     let wake = Arc::new(TokioWakeScheduler::new(clock.notification_sender()));
//!     let (host, mut callbacks) = ChannelHost::new(HostEnvironment::default(), queue);
//!
//!     let controller = TimeController::new(Arc::downgrade(&host), clock, wake)?;
//!     controller.set_twelve_hour_pattern("h:mm:ss a")?;
//!     controller.attach();
//!
//!     while let Some(HostCallback::TimeChanged(time)) = callbacks.recv().await {
//!         println!("{}", controller.format().render(&time));
//!     }
//!     Ok(())
//! }
//! ```

pub const CONTROLLER_NAME: &str = "Watchface Time Controller";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod common;
pub mod components;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod format;
pub mod host;
pub mod wake;

/// A prelude module for easy importing of the most common watchface types.
pub mod prelude {
    pub use crate::clock::{ClockSource, SystemClock};
    pub use crate::common::{AttachmentState, SubscriptionId, WakeRequestId};
    pub use crate::config::WatchConfig;
    pub use crate::controller::{ControllerSnapshot, TimeController};
    pub use crate::dispatch::{DispatchQueue, ScheduledJob};
    pub use crate::error::{PatternError, WatchError};
    pub use crate::events::{HostCallback, Notification, SettingsChange, WatchEvent};
    pub use crate::format::{DisplayFormat, DisplayLocale};
    pub use crate::host::{ChannelHost, Host, HostEnvironment};
    pub use crate::wake::{TokioWakeScheduler, WakeScheduler};
}
