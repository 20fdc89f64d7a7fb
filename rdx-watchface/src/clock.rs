//! The clock source collaborator: wall-clock time, the system zone, a
//! monotonic uptime, and the system notification streams.

use crate::events::{Notification, SettingsChange};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace};

const CHANNEL_CAPACITY: usize = 64;
const MINUTE_MILLIS: i64 = 60_000;

/// Everything a controller needs to know about time.
pub trait ClockSource: Send + Sync {
    /// The current wall-clock instant.
    fn now(&self) -> DateTime<Utc>;

    /// The zone used when no override is set.
    fn system_zone(&self) -> Tz;

    /// Time elapsed on a monotonic clock. Ticks align to its whole seconds.
    fn uptime(&self) -> Duration;

    /// Time tick, time changed, zone changed, keep-awake and battery broadcasts.
    fn subscribe_notifications(&self) -> broadcast::Receiver<Notification>;

    fn subscribe_settings(&self) -> broadcast::Receiver<SettingsChange>;
}

/// The real clock, backed by the system wall clock and Tokio's monotonic clock.
///
/// It also acts as the broadcast hub: whatever is published here reaches every
/// subscribed controller.
pub struct SystemClock {
    started: Instant,
    system_zone: RwLock<Tz>,
    notifications: broadcast::Sender<Notification>,
    settings: broadcast::Sender<SettingsChange>,
}

impl SystemClock {
    pub fn new(system_zone: Tz) -> Self {
        let (notifications, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (settings, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            started: Instant::now(),
            system_zone: RwLock::new(system_zone),
            notifications,
            settings,
        }
    }

    /// Broadcasts a notification.
    ///
    /// A `TimeZoneChanged` notification moves the system zone before it is
    /// delivered, so listeners reading the zone see the new one.
    pub fn publish(&self, notification: Notification) {
        if let Notification::TimeZoneChanged { zone } = &notification {
            debug!("System time zone is now {}", zone.name());
            *self.system_zone.write() = *zone;
        }
        let receivers = self.notifications.send(notification).unwrap_or(0);
        trace!("Notification delivered to {} receiver(s).", receivers);
    }

    pub fn publish_settings_change(&self, change: SettingsChange) {
        self.settings.send(change).ok();
    }

    /// A sender onto the notification stream, for collaborators such as a
    /// wake scheduler that emit notifications of their own.
    pub fn notification_sender(&self) -> broadcast::Sender<Notification> {
        self.notifications.clone()
    }

    pub fn notification_subscribers(&self) -> usize {
        self.notifications.receiver_count()
    }

    pub fn settings_subscribers(&self) -> usize {
        self.settings.receiver_count()
    }

    /// Spawns a task that publishes `TimeTick` at every wall-clock minute
    /// boundary until `shutdown_rx` fires.
    pub fn spawn_minute_ticker(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let clock = Arc::clone(self);
        tokio::spawn(async move {
            info!("Minute ticker started.");
            loop {
                let wait = until_next_minute(clock.now());
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(wait) => clock.publish(Notification::TimeTick),
                }
            }
            info!("Minute ticker stopped.");
        })
    }
}

impl ClockSource for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn system_zone(&self) -> Tz {
        *self.system_zone.read()
    }

    fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    fn subscribe_settings(&self) -> broadcast::Receiver<SettingsChange> {
        self.settings.subscribe()
    }
}

fn until_next_minute(now: DateTime<Utc>) -> Duration {
    let into_minute = now.timestamp_millis().rem_euclid(MINUTE_MILLIS);
    Duration::from_millis((MINUTE_MILLIS - into_minute) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn minute_boundary_is_never_zero() {
        let on_boundary = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        assert_eq!(until_next_minute(on_boundary), Duration::from_secs(60));

        let mid_minute = on_boundary + chrono::Duration::milliseconds(45_250);
        assert_eq!(until_next_minute(mid_minute), Duration::from_millis(14_750));
    }

    #[tokio::test]
    async fn zone_change_moves_the_system_zone_before_delivery() {
        let clock = SystemClock::new(chrono_tz::UTC);
        let mut rx = clock.subscribe_notifications();

        clock.publish(Notification::TimeZoneChanged {
            zone: chrono_tz::Asia::Tokyo,
        });

        assert_eq!(clock.system_zone(), chrono_tz::Asia::Tokyo);
        assert_eq!(
            rx.recv().await.unwrap(),
            Notification::TimeZoneChanged {
                zone: chrono_tz::Asia::Tokyo
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn uptime_follows_the_monotonic_clock() {
        let clock = SystemClock::new(chrono_tz::UTC);
        tokio::time::advance(Duration::from_millis(2_500)).await;
        assert_eq!(clock.uptime(), Duration::from_millis(2_500));
    }
}
