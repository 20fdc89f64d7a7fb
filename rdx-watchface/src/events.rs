//! Defines the events that flow into a controller and the callbacks that flow
//! out of a [`ChannelHost`](crate::host::ChannelHost).
//!
//! Every inbound stream is folded into a single [`WatchEvent`] so the
//! controller handles all of them in one place, keyed by [`EventKind`].

use chrono::DateTime;
use chrono_tz::Tz;

/// A discrete system broadcast delivered by a `ClockSource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The periodic (per-minute) system time tick.
    TimeTick,
    /// The wall clock was set.
    TimeChanged,
    /// The system time zone moved to `zone`.
    TimeZoneChanged { zone: Tz },
    /// Fired by a low-power wake request. Exists only to keep the host
    /// process from being suspended and carries no time update.
    KeepAwake,
    /// A battery broadcast with the charge percentage.
    BatteryChanged { level: u8 },
}

/// A change in the system settings store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsChange {
    /// The setting that changed, when the store reports it.
    pub key: Option<String>,
}

impl SettingsChange {
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
        }
    }
}

/// Any inbound event, after it has been marshaled onto the dispatch queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Notification(Notification),
    Settings(SettingsChange),
}

/// The dispatch key of a [`WatchEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    TimeTick,
    TimeChanged,
    TimeZoneChanged,
    KeepAwake,
    BatteryChanged,
    SettingsChanged,
}

impl WatchEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WatchEvent::Notification(Notification::TimeTick) => EventKind::TimeTick,
            WatchEvent::Notification(Notification::TimeChanged) => EventKind::TimeChanged,
            WatchEvent::Notification(Notification::TimeZoneChanged { .. }) => {
                EventKind::TimeZoneChanged
            }
            WatchEvent::Notification(Notification::KeepAwake) => EventKind::KeepAwake,
            WatchEvent::Notification(Notification::BatteryChanged { .. }) => {
                EventKind::BatteryChanged
            }
            WatchEvent::Settings(_) => EventKind::SettingsChanged,
        }
    }
}

impl From<Notification> for WatchEvent {
    fn from(notification: Notification) -> Self {
        WatchEvent::Notification(notification)
    }
}

impl From<SettingsChange> for WatchEvent {
    fn from(change: SettingsChange) -> Self {
        WatchEvent::Settings(change)
    }
}

/// A host callback, as recorded by a channel-backed host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostCallback {
    ActiveStateChanged(bool),
    TimeChanged(DateTime<Tz>),
    BatteryLevelChanged(u8),
}
