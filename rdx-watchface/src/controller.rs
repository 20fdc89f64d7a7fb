//! The time controller that drives a watch face host.

use crate::clock::ClockSource;
use crate::common::{
    AttachmentState, SubscriptionId, WakeRequestId, WAKE_INTERVAL, WAKE_START_OFFSET,
};
use crate::components::ticker::{next_second_boundary, ScheduledTick};
use crate::components::watcher::StreamWatcher;
use crate::dispatch::DispatchQueue;
use crate::error::{Result, WatchError};
use crate::events::{Notification, WatchEvent};
use crate::format::{select_format, DisplayFormat, DisplayLocale};
use crate::host::{Host, HostRef};
use crate::wake::WakeScheduler;
use chrono::DateTime;
use chrono_tz::Tz;
use parking_lot::Mutex;
use slotmap::SlotMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, trace};

/// Keeps one host informed of the current time, battery level and display
/// format.
///
/// The controller is bound to exactly one host at construction and holds it
/// only weakly. Handles are cheap to clone and all share the same state.
///
/// All public operations and every internal callback are meant to run on the
/// host's [`DispatchQueue`]; inbound notifications are marshaled onto it
/// before they touch any state. Operations that spawn work (`attach`, and any
/// call that may start the ticker) must run inside a Tokio runtime.
#[derive(Clone)]
pub struct TimeController {
    inner: Arc<Inner>,
}

struct Inner {
    host: HostRef,
    clock: Arc<dyn ClockSource>,
    wake: Arc<dyn WakeScheduler>,
    state: Mutex<ControllerState>,
}

struct ControllerState {
    attachment: AttachmentState,
    /// Bumped on every attach; stream events carry the epoch they were
    /// subscribed under.
    epoch: u64,
    format: DisplayFormat,
    twelve_hour: Option<DisplayFormat>,
    twenty_four_hour: Option<DisplayFormat>,
    time_zone: Option<Tz>,
    queue: Option<DispatchQueue>,
    subscriptions: SlotMap<SubscriptionId, StreamWatcher>,
    wake_request: Option<WakeRequestId>,
    tick: Option<ScheduledTick>,
    tick_serial: u64,
}

impl ControllerState {
    fn is_current(&self, epoch: u64) -> bool {
        self.attachment.is_attached() && self.epoch == epoch
    }

    fn cancel_tick(&mut self) {
        if let Some(tick) = self.tick.take() {
            trace!("Cancelling tick #{}", tick.serial);
            tick.cancel();
        }
    }
}

/// A point-in-time view of a controller, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub attachment: AttachmentState,
    pub subscriptions: usize,
    pub tick_scheduled: bool,
    pub wake_request: Option<WakeRequestId>,
    pub pattern: String,
    pub includes_seconds: bool,
    pub time_zone: Option<Tz>,
}

// Lifecycle.
impl TimeController {
    /// Binds a new controller to `host`.
    ///
    /// Fails with [`WatchError::MissingHost`] if `host` is already gone. The
    /// active format is computed immediately from the host's locale and
    /// 24-hour policy; ticking waits for [`attach`](Self::attach).
    pub fn new<H>(
        host: Weak<H>,
        clock: Arc<dyn ClockSource>,
        wake: Arc<dyn WakeScheduler>,
    ) -> Result<Self>
    where
        H: Host + 'static,
    {
        let host: Weak<dyn Host> = host;
        let environment = host
            .upgrade()
            .ok_or(WatchError::MissingHost)?
            .environment();
        let format = select_format(environment.use_24_hour, None, None, &environment.locale);
        debug!("Controller created with format {:?}", format.pattern());

        Ok(Self {
            inner: Arc::new(Inner {
                host: HostRef::new(host),
                clock,
                wake,
                state: Mutex::new(ControllerState {
                    attachment: AttachmentState::Detached,
                    epoch: 0,
                    format,
                    twelve_hour: None,
                    twenty_four_hour: None,
                    time_zone: None,
                    queue: None,
                    subscriptions: SlotMap::with_key(),
                    wake_request: None,
                    tick: None,
                    tick_serial: 0,
                }),
            }),
        })
    }

    /// Subscribes to the clock source, registers a wake request if the host
    /// wants seconds while dimmed, and starts ticking.
    ///
    /// A no-op if already attached or if the host is gone.
    pub fn attach(&self) {
        if self.is_attached() {
            return;
        }
        let Some(host) = self.inner.host.upgrade() else {
            debug!("attach() ignored: host is gone.");
            return;
        };
        let queue = host.dispatch_queue();
        let wants_wake = host.handles_seconds_in_dim_mode() && !host.is_in_edit_mode();
        drop(host);

        let includes_seconds = {
            let mut state = self.inner.state.lock();
            if state.attachment.is_attached() {
                return;
            }
            state.attachment = AttachmentState::Attached;
            state.epoch += 1;
            let epoch = state.epoch;
            state.queue = Some(queue.clone());

            let notifications = self.watch_stream(
                "notifications",
                self.inner.clock.subscribe_notifications(),
                &queue,
                epoch,
            );
            state.subscriptions.insert(notifications);
            let settings = self.watch_stream(
                "settings",
                self.inner.clock.subscribe_settings(),
                &queue,
                epoch,
            );
            state.subscriptions.insert(settings);

            if wants_wake {
                let id = self.inner.wake.schedule_repeating(WAKE_START_OFFSET, WAKE_INTERVAL);
                state.wake_request = Some(id);
            }

            info!(
                "Attached (epoch {}, format {:?}, wake request: {}).",
                epoch,
                state.format.pattern(),
                wants_wake
            );
            state.format.includes_seconds()
        };

        if includes_seconds {
            self.tick();
        } else {
            self.push_time();
        }
    }

    /// Unsubscribes everything, cancels the wake request and the ticker.
    ///
    /// Cleanup does not depend on what `attach` managed to complete nor on
    /// the host still being alive. Once this returns, no tick or notification
    /// queued earlier will reach the host. A no-op if already detached.
    pub fn detach(&self) {
        let mut state = self.inner.state.lock();
        if !state.attachment.is_attached() {
            return;
        }

        for (_, watcher) in state.subscriptions.drain() {
            trace!("Unsubscribing from {} stream.", watcher.label);
            watcher.cancel();
        }
        if let Some(id) = state.wake_request.take() {
            self.inner.wake.cancel(id);
        }
        state.cancel_tick();
        state.queue = None;
        state.attachment = AttachmentState::Detached;
        info!("Detached (epoch {}).", state.epoch);
    }

    pub fn is_attached(&self) -> bool {
        self.inner.state.lock().attachment.is_attached()
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let state = self.inner.state.lock();
        ControllerSnapshot {
            attachment: state.attachment,
            subscriptions: state.subscriptions.len(),
            tick_scheduled: state.tick.is_some(),
            wake_request: state.wake_request,
            pattern: state.format.pattern().to_string(),
            includes_seconds: state.format.includes_seconds(),
            time_zone: state.time_zone,
        }
    }
}

// Formats and time zones.
impl TimeController {
    /// Sets the 12-hour pattern, reselects the active format and pushes a
    /// fresh time.
    pub fn set_twelve_hour_pattern(&self, pattern: &str) -> Result<()> {
        let format = DisplayFormat::parse(pattern, &self.locale())?;
        self.inner.state.lock().twelve_hour = Some(format);
        self.recompute_format(true);
        self.push_time();
        Ok(())
    }

    /// Sets the 24-hour pattern, reselects the active format and pushes a
    /// fresh time.
    pub fn set_twenty_four_hour_pattern(&self, pattern: &str) -> Result<()> {
        let format = DisplayFormat::parse(pattern, &self.locale())?;
        self.inner.state.lock().twenty_four_hour = Some(format);
        self.recompute_format(true);
        self.push_time();
        Ok(())
    }

    /// The user 12-hour format, if one was set.
    pub fn twelve_hour_format(&self) -> Option<DisplayFormat> {
        self.inner.state.lock().twelve_hour.clone()
    }

    /// The user 24-hour format, if one was set.
    pub fn twenty_four_hour_format(&self) -> Option<DisplayFormat> {
        self.inner.state.lock().twenty_four_hour.clone()
    }

    /// The active format.
    pub fn format(&self) -> DisplayFormat {
        self.inner.state.lock().format.clone()
    }

    pub fn includes_seconds(&self) -> bool {
        self.inner.state.lock().format.includes_seconds()
    }

    /// Whether the host currently asks for 24-hour display. False once the
    /// host is gone.
    pub fn is_24_hour_mode_enabled(&self) -> bool {
        self.inner
            .host
            .upgrade()
            .is_some_and(|host| host.environment().use_24_hour)
    }

    /// Pins time computation to `zone`, or back to the system zone with
    /// `None`, and pushes a fresh time. The format is left alone.
    pub fn set_time_zone(&self, zone: Option<Tz>) {
        self.inner.state.lock().time_zone = zone;
        debug!(
            "Time zone override: {}",
            zone.map_or("system default", |zone| zone.name())
        );
        self.push_time();
    }

    /// Like [`set_time_zone`](Self::set_time_zone), from an IANA identifier.
    pub fn set_time_zone_id(&self, id: Option<&str>) -> Result<()> {
        let zone = id
            .map(|id| {
                id.parse::<Tz>()
                    .map_err(|_| WatchError::UnknownTimeZone(id.to_string()))
            })
            .transpose()?;
        self.set_time_zone(zone);
        Ok(())
    }

    /// The override zone, or `None` when the system zone is in use.
    pub fn time_zone(&self) -> Option<Tz> {
        self.inner.state.lock().time_zone
    }

    /// "Now" in the override zone if set, else in the system zone.
    pub fn current_time(&self) -> DateTime<Tz> {
        let override_zone = self.inner.state.lock().time_zone;
        let zone = override_zone.unwrap_or_else(|| self.inner.clock.system_zone());
        self.inner.clock.now().with_timezone(&zone)
    }

    /// The current time rendered with the active format.
    pub fn formatted_time(&self) -> String {
        let format = self.format();
        format.render(&self.current_time())
    }
}

// Internal machinery. Everything here runs on the dispatch queue.
impl TimeController {
    fn locale(&self) -> DisplayLocale {
        self.inner
            .host
            .upgrade()
            .map(|host| host.environment().locale)
            .unwrap_or_default()
    }

    fn watch_stream<E>(
        &self,
        label: &'static str,
        events: broadcast::Receiver<E>,
        queue: &DispatchQueue,
        epoch: u64,
    ) -> StreamWatcher
    where
        E: Into<WatchEvent> + Clone + Send + 'static,
    {
        let weak = Arc::downgrade(&self.inner);
        StreamWatcher::spawn(label, events, queue.clone(), move |event: E| {
            if let Some(inner) = weak.upgrade() {
                TimeController { inner }.dispatch(epoch, event.into());
            }
        })
    }

    /// The single handler for every inbound event.
    fn dispatch(&self, epoch: u64, event: WatchEvent) {
        if !self.inner.state.lock().is_current(epoch) {
            trace!("Dropping stale {:?} from epoch {}.", event.kind(), epoch);
            return;
        }
        trace!("Dispatching {:?}", event.kind());

        match event {
            WatchEvent::Notification(Notification::KeepAwake) => {}
            WatchEvent::Notification(
                Notification::TimeTick
                | Notification::TimeChanged
                | Notification::TimeZoneChanged { .. },
            ) => self.push_time(),
            WatchEvent::Notification(Notification::BatteryChanged { level }) => {
                if let Some(host) = self.inner.host.upgrade() {
                    host.on_battery_level_changed(level);
                }
            }
            WatchEvent::Settings(_) => {
                self.recompute_format(true);
                self.push_time();
            }
        }
    }

    /// Reselects the active format from the host's policy.
    ///
    /// With `adjust_ticker`, while attached, losing seconds cancels the
    /// recurring tick and gaining them fires an immediate tick, which re-arms
    /// the schedule.
    fn recompute_format(&self, adjust_ticker: bool) {
        let Some(host) = self.inner.host.upgrade() else {
            return;
        };
        let environment = host.environment();
        drop(host);

        let gained_seconds = {
            let mut state = self.inner.state.lock();
            let had_seconds = state.format.includes_seconds();
            state.format = select_format(
                environment.use_24_hour,
                state.twelve_hour.as_ref(),
                state.twenty_four_hour.as_ref(),
                &environment.locale,
            );
            let has_seconds = state.format.includes_seconds();
            debug!(
                "Active format {:?} (seconds: {})",
                state.format.pattern(),
                has_seconds
            );

            if !adjust_ticker || !state.attachment.is_attached() || had_seconds == has_seconds {
                false
            } else if had_seconds {
                state.cancel_tick();
                false
            } else {
                true
            }
        };

        if gained_seconds {
            self.tick();
        }
    }

    /// Pushes the time, then re-arms for the next whole second while attached
    /// and the host is alive.
    fn tick(&self) {
        self.push_time();

        let delay = next_second_boundary(self.inner.clock.uptime());
        let deadline = Instant::now() + delay;

        let mut state = self.inner.state.lock();
        if !state.attachment.is_attached() || !self.inner.host.is_alive() {
            state.cancel_tick();
            return;
        }
        let Some(queue) = state.queue.clone() else {
            return;
        };

        state.tick_serial += 1;
        let serial = state.tick_serial;
        let weak = Arc::downgrade(&self.inner);
        let job = queue.post_at(deadline, move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let armed = inner
                .state
                .lock()
                .tick
                .as_ref()
                .is_some_and(|tick| tick.serial == serial);
            if armed {
                TimeController { inner }.tick();
            }
        });

        trace!("Tick #{} armed in {:?} (deadline {:?})", serial, delay, job.deadline());
        if let Some(previous) = state.tick.replace(ScheduledTick::new(serial, job)) {
            previous.cancel();
        }
    }

    fn push_time(&self) {
        if let Some(host) = self.inner.host.upgrade() {
            host.on_time_changed(self.current_time());
        }
    }
}
