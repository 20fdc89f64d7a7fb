//! The host capability contract and a channel-backed host implementation.
//!
//! A controller holds its host through a [`HostRef`], which never extends the
//! host's lifetime. Every access upgrades the reference first and silently
//! does nothing if the host has already been dropped.

use crate::dispatch::DispatchQueue;
use crate::events::HostCallback;
use crate::format::DisplayLocale;
use chrono::DateTime;
use chrono_tz::Tz;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;

/// Locale and system policy a host exposes to the controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    pub locale: DisplayLocale,
    /// The system 24-hour preference.
    pub use_24_hour: bool,
}

/// The display surface a controller drives.
pub trait Host: Send + Sync {
    /// Reserved for host-driven dimming transitions. The controller never
    /// calls it.
    fn on_active_state_changed(&self, active: bool);

    fn on_time_changed(&self, time: DateTime<Tz>);

    fn on_battery_level_changed(&self, percentage: u8);

    /// If true, the controller requests per-second low-power wake-ups while
    /// the host is dimmed. This costs battery.
    fn handles_seconds_in_dim_mode(&self) -> bool;

    /// A design-time preview host. Wake requests are never registered for it.
    fn is_in_edit_mode(&self) -> bool;

    /// The queue all controller work is serialized on.
    fn dispatch_queue(&self) -> DispatchQueue;

    fn environment(&self) -> HostEnvironment;
}

/// A non-owning, liveness-checked handle to a host.
#[derive(Clone)]
pub(crate) struct HostRef(Weak<dyn Host>);

impl HostRef {
    pub(crate) fn new(host: Weak<dyn Host>) -> Self {
        Self(host)
    }

    pub(crate) fn upgrade(&self) -> Option<Arc<dyn Host>> {
        self.0.upgrade()
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

/// A host that forwards every callback into an unbounded channel.
///
/// Its policy flags can be flipped at runtime, which makes it a convenient
/// host for shells, demos and tests.
pub struct ChannelHost {
    environment: RwLock<HostEnvironment>,
    seconds_in_dim_mode: AtomicBool,
    edit_mode: AtomicBool,
    queue: DispatchQueue,
    callbacks: mpsc::UnboundedSender<HostCallback>,
}

impl ChannelHost {
    pub fn new(
        environment: HostEnvironment,
        queue: DispatchQueue,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<HostCallback>) {
        let (callbacks, receiver) = mpsc::unbounded_channel();
        let host = Arc::new(Self {
            environment: RwLock::new(environment),
            seconds_in_dim_mode: AtomicBool::new(false),
            edit_mode: AtomicBool::new(false),
            queue,
            callbacks,
        });
        (host, receiver)
    }

    pub fn set_use_24_hour(&self, enabled: bool) {
        self.environment.write().use_24_hour = enabled;
    }

    pub fn set_locale(&self, locale: DisplayLocale) {
        self.environment.write().locale = locale;
    }

    pub fn set_seconds_in_dim_mode(&self, enabled: bool) {
        self.seconds_in_dim_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn set_edit_mode(&self, enabled: bool) {
        self.edit_mode.store(enabled, Ordering::Relaxed);
    }

    fn emit(&self, callback: HostCallback) {
        // The receiver going away just means nobody is watching any more.
        self.callbacks.send(callback).ok();
    }
}

impl Host for ChannelHost {
    fn on_active_state_changed(&self, active: bool) {
        self.emit(HostCallback::ActiveStateChanged(active));
    }

    fn on_time_changed(&self, time: DateTime<Tz>) {
        self.emit(HostCallback::TimeChanged(time));
    }

    fn on_battery_level_changed(&self, percentage: u8) {
        self.emit(HostCallback::BatteryLevelChanged(percentage));
    }

    fn handles_seconds_in_dim_mode(&self) -> bool {
        self.seconds_in_dim_mode.load(Ordering::Relaxed)
    }

    fn is_in_edit_mode(&self) -> bool {
        self.edit_mode.load(Ordering::Relaxed)
    }

    fn dispatch_queue(&self) -> DispatchQueue {
        self.queue.clone()
    }

    fn environment(&self) -> HostEnvironment {
        self.environment.read().clone()
    }
}
