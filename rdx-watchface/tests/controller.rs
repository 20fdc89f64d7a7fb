use chrono::Offset;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use watchface::prelude::*;

struct Rig {
    clock: Arc<SystemClock>,
    wake: Arc<TokioWakeScheduler>,
    host: Arc<ChannelHost>,
    callbacks: mpsc::UnboundedReceiver<HostCallback>,
    controller: TimeController,
}

fn rig(use_24_hour: bool) -> Rig {
    let queue = DispatchQueue::spawn();
    let clock = Arc::new(SystemClock::new(chrono_tz::UTC));
    let wake = Arc::new(TokioWakeScheduler::new(clock.notification_sender()));
    let environment = HostEnvironment {
        use_24_hour,
        ..Default::default()
    };
    let (host, callbacks) = ChannelHost::new(environment, queue);
    let controller =
        TimeController::new(Arc::downgrade(&host), clock.clone(), wake.clone()).unwrap();
    Rig {
        clock,
        wake,
        host,
        callbacks,
        controller,
    }
}

/// Lets spawned forwarders, timers and the dispatch queue run to quiescence
/// without moving the paused clock.
async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

fn drain(callbacks: &mut mpsc::UnboundedReceiver<HostCallback>) -> Vec<HostCallback> {
    let mut seen = Vec::new();
    while let Ok(callback) = callbacks.try_recv() {
        seen.push(callback);
    }
    seen
}

fn time_pushes(callbacks: &mut mpsc::UnboundedReceiver<HostCallback>) -> usize {
    drain(callbacks)
        .iter()
        .filter(|callback| matches!(callback, HostCallback::TimeChanged(_)))
        .count()
}

#[derive(Clone, Copy, Debug)]
enum Op {
    Attach,
    Detach,
}

#[tokio::test(start_paused = true)]
async fn attach_and_detach_are_idempotent() {
    use Op::{Attach, Detach};
    let sequences: &[&[Op]] = &[
        &[Attach],
        &[Attach, Attach],
        &[Detach],
        &[Attach, Detach],
        &[Attach, Detach, Detach],
        &[Attach, Detach, Attach],
        &[Detach, Detach, Attach, Attach],
    ];

    for sequence in sequences {
        let rig = rig(true);
        rig.host.set_seconds_in_dim_mode(true);
        for op in sequence.iter() {
            match op {
                Attach => rig.controller.attach(),
                Detach => rig.controller.detach(),
            }
        }
        settle().await;

        let attached = matches!(sequence.last(), Some(Attach));
        let expected = usize::from(attached);
        let snapshot = rig.controller.snapshot();
        assert_eq!(snapshot.attachment.is_attached(), attached, "{sequence:?}");
        assert_eq!(snapshot.subscriptions, 2 * expected, "{sequence:?}");
        assert_eq!(rig.clock.notification_subscribers(), expected, "{sequence:?}");
        assert_eq!(rig.clock.settings_subscribers(), expected, "{sequence:?}");
        assert_eq!(rig.wake.active_requests(), expected, "{sequence:?}");
        assert_eq!(snapshot.wake_request.is_some(), attached, "{sequence:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn double_attach_arms_a_single_ticker() {
    let mut rig = rig(true);
    rig.controller.set_twenty_four_hour_pattern("HH:mm:ss").unwrap();
    drain(&mut rig.callbacks);

    rig.controller.attach();
    rig.controller.attach();
    assert_eq!(time_pushes(&mut rig.callbacks), 1);
    assert!(rig.controller.snapshot().tick_scheduled);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 2);
}

#[tokio::test(start_paused = true)]
async fn attach_without_seconds_pushes_once_and_does_not_tick() {
    let mut rig = rig(true);
    rig.controller.attach();

    let snapshot = rig.controller.snapshot();
    assert_eq!(snapshot.pattern, "H:mm");
    assert!(!snapshot.includes_seconds);
    assert!(!snapshot.tick_scheduled);
    assert_eq!(time_pushes(&mut rig.callbacks), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 0);
}

#[tokio::test(start_paused = true)]
async fn gaining_seconds_fires_one_tick_and_arms_the_ticker() {
    let mut rig = rig(true);
    rig.controller.attach();
    assert_eq!(time_pushes(&mut rig.callbacks), 1);
    assert!(!rig.controller.snapshot().tick_scheduled);

    rig.host.set_use_24_hour(false);
    rig.controller.set_twelve_hour_pattern("h:mm:ss a").unwrap();

    let snapshot = rig.controller.snapshot();
    assert_eq!(snapshot.pattern, "h:mm:ss a");
    assert!(snapshot.includes_seconds);
    assert!(snapshot.tick_scheduled);
    // The immediate tick, then the setter's own push.
    assert_eq!(time_pushes(&mut rig.callbacks), 2);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 1);

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 1);
}

#[tokio::test(start_paused = true)]
async fn losing_seconds_cancels_the_ticker() {
    let mut rig = rig(true);
    rig.controller.set_twenty_four_hour_pattern("HH:mm:ss").unwrap();
    rig.controller.attach();
    assert!(rig.controller.snapshot().tick_scheduled);
    drain(&mut rig.callbacks);

    rig.controller.set_twenty_four_hour_pattern("HH:mm").unwrap();
    assert!(!rig.controller.snapshot().tick_scheduled);
    assert_eq!(time_pushes(&mut rig.callbacks), 1);

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 0);
}

#[tokio::test(start_paused = true)]
async fn ticks_stop_after_detach() {
    let mut rig = rig(false);
    rig.controller.set_twelve_hour_pattern("h:mm:ss a").unwrap();
    rig.controller.attach();
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    settle().await;
    assert!(time_pushes(&mut rig.callbacks) >= 2);

    rig.controller.detach();
    assert!(!rig.controller.snapshot().tick_scheduled);

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 0);
}

#[tokio::test(start_paused = true)]
async fn settings_change_reselects_the_format() {
    let mut rig = rig(true);
    rig.controller.attach();
    drain(&mut rig.callbacks);

    rig.host.set_use_24_hour(false);
    rig.clock.publish_settings_change(SettingsChange::key("time_12_24"));
    settle().await;

    assert_eq!(rig.controller.format().pattern(), "h:mm a");
    assert!(!rig.controller.is_24_hour_mode_enabled());
    assert_eq!(time_pushes(&mut rig.callbacks), 1);
}

#[tokio::test(start_paused = true)]
async fn settings_change_rebinds_user_patterns_to_the_new_locale() {
    let mut rig = rig(false);
    rig.controller.set_twelve_hour_pattern("h:mm a").unwrap();
    rig.controller.attach();
    drain(&mut rig.callbacks);

    let german = DisplayLocale::new("de-DE", "vorm.", "nachm.");
    rig.host.set_locale(german.clone());
    rig.clock.publish_settings_change(SettingsChange::key("locale"));
    settle().await;

    let active = rig.controller.format();
    assert_eq!(active.pattern(), "h:mm a");
    assert_eq!(active.locale(), &german);
    let text = rig.controller.formatted_time();
    assert!(text.ends_with("vorm.") || text.ends_with("nachm."), "{text}");
    assert_eq!(time_pushes(&mut rig.callbacks), 1);
}

#[tokio::test(start_paused = true)]
async fn settings_change_that_gains_seconds_starts_ticking() {
    let rig = rig(true);
    rig.controller.set_twenty_four_hour_pattern("HH:mm").unwrap();
    rig.controller.set_twelve_hour_pattern("h:mm:ss a").unwrap();
    rig.controller.attach();
    assert_eq!(rig.controller.format().pattern(), "HH:mm");
    assert!(!rig.controller.snapshot().tick_scheduled);

    rig.host.set_use_24_hour(false);
    rig.clock.publish_settings_change(SettingsChange::default());
    settle().await;

    let snapshot = rig.controller.snapshot();
    assert_eq!(snapshot.pattern, "h:mm:ss a");
    assert!(snapshot.tick_scheduled);
}

#[tokio::test(start_paused = true)]
async fn notifications_are_dispatched_by_kind() {
    let mut rig = rig(true);
    rig.controller.attach();
    drain(&mut rig.callbacks);

    rig.clock.publish(Notification::TimeTick);
    rig.clock.publish(Notification::TimeChanged);
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 2);

    rig.clock.publish(Notification::KeepAwake);
    settle().await;
    assert!(drain(&mut rig.callbacks).is_empty());

    rig.clock.publish(Notification::BatteryChanged { level: 57 });
    settle().await;
    assert_eq!(
        drain(&mut rig.callbacks),
        vec![HostCallback::BatteryLevelChanged(57)]
    );
}

#[tokio::test(start_paused = true)]
async fn system_zone_change_is_followed_without_an_override() {
    let mut rig = rig(true);
    rig.controller.attach();
    drain(&mut rig.callbacks);

    rig.clock.publish(Notification::TimeZoneChanged {
        zone: chrono_tz::Asia::Tokyo,
    });
    settle().await;

    match drain(&mut rig.callbacks).as_slice() {
        [HostCallback::TimeChanged(time)] => {
            assert_eq!(time.timezone(), chrono_tz::Asia::Tokyo)
        }
        other => panic!("expected one time push, got {other:?}"),
    }
    assert_eq!(rig.controller.time_zone(), None);
}

#[tokio::test(start_paused = true)]
async fn wake_request_lives_exactly_as_long_as_the_attachment() {
    let mut rig = rig(true);
    rig.host.set_seconds_in_dim_mode(true);
    rig.controller.attach();
    drain(&mut rig.callbacks);

    let id = rig.controller.snapshot().wake_request.unwrap();
    assert_eq!(rig.wake.active_requests(), 1);
    assert_eq!(rig.wake.interval_of(id), Some(Duration::from_millis(1_000)));

    // Keep-awake wake-ups carry no time update.
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 0);

    rig.controller.detach();
    assert_eq!(rig.wake.active_requests(), 0);
    assert_eq!(rig.wake.interval_of(id), None);
    assert_eq!(rig.controller.snapshot().wake_request, None);
}

#[tokio::test(start_paused = true)]
async fn edit_mode_suppresses_the_wake_request() {
    let rig = rig(true);
    rig.host.set_seconds_in_dim_mode(true);
    rig.host.set_edit_mode(true);
    rig.controller.attach();

    assert!(rig.controller.is_attached());
    assert_eq!(rig.controller.snapshot().wake_request, None);
    assert_eq!(rig.wake.active_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn nothing_reaches_the_host_after_detach() {
    let mut rig = rig(true);
    rig.controller.attach();
    drain(&mut rig.callbacks);

    rig.clock.publish(Notification::TimeChanged);
    rig.clock.publish(Notification::BatteryChanged { level: 12 });
    rig.controller.detach();
    settle().await;

    assert!(drain(&mut rig.callbacks).is_empty());
}

#[tokio::test(start_paused = true)]
async fn reattach_ignores_events_from_the_previous_attachment() {
    let mut rig = rig(true);
    rig.controller.attach();
    rig.controller.detach();
    rig.controller.attach();
    drain(&mut rig.callbacks);

    rig.clock.publish(Notification::TimeChanged);
    settle().await;
    assert_eq!(time_pushes(&mut rig.callbacks), 1);
}

#[tokio::test(start_paused = true)]
async fn unreachable_host_turns_notifications_into_no_ops() {
    let Rig {
        clock,
        host,
        mut callbacks,
        controller,
        ..
    } = rig(true);
    controller.attach();
    drain(&mut callbacks);

    let before = controller.snapshot();
    drop(host);

    clock.publish(Notification::TimeChanged);
    clock.publish(Notification::BatteryChanged { level: 80 });
    clock.publish_settings_change(SettingsChange::default());
    settle().await;

    assert_eq!(controller.snapshot(), before);
    assert!(callbacks.try_recv().is_err());
    assert!(!controller.is_24_hour_mode_enabled());
}

#[tokio::test(start_paused = true)]
async fn attach_after_host_is_gone_is_a_no_op() {
    let Rig {
        clock,
        host,
        controller,
        ..
    } = rig(true);
    drop(host);

    controller.attach();
    settle().await;

    assert!(!controller.is_attached());
    assert_eq!(clock.notification_subscribers(), 0);
    // Cleanup never needs the host.
    controller.detach();
}

#[tokio::test]
async fn construction_without_a_host_is_rejected() {
    let clock = Arc::new(SystemClock::new(chrono_tz::UTC));
    let wake = Arc::new(TokioWakeScheduler::new(clock.notification_sender()));

    let result = TimeController::new(Weak::<ChannelHost>::new(), clock, wake);
    assert!(matches!(result, Err(WatchError::MissingHost)));
}

#[tokio::test]
async fn invalid_patterns_propagate_and_leave_the_format_alone() {
    let rig = rig(false);
    let before = rig.controller.format();

    let err = rig.controller.set_twelve_hour_pattern("h:mm:ss.SSS").unwrap_err();
    assert_eq!(
        err,
        WatchError::InvalidPattern {
            pattern: "h:mm:ss.SSS".to_string(),
            reason: PatternError::UnsupportedLetter('S'),
        }
    );
    assert_eq!(rig.controller.format(), before);
    assert!(rig.controller.twelve_hour_format().is_none());
}

#[tokio::test]
async fn time_zone_override_moves_the_offset_but_not_the_format() {
    let mut rig = rig(false);
    rig.controller.set_twelve_hour_pattern("h:mm:ss a").unwrap();
    let before = rig.controller.snapshot();
    drain(&mut rig.callbacks);

    rig.controller.set_time_zone(Some(chrono_tz::Asia::Tokyo));
    let tokyo = rig.controller.current_time();
    assert_eq!(tokyo.offset().fix().local_minus_utc(), 9 * 3600);

    let after = rig.controller.snapshot();
    assert_eq!(after.pattern, before.pattern);
    assert_eq!(after.includes_seconds, before.includes_seconds);
    assert_eq!(after.time_zone, Some(chrono_tz::Asia::Tokyo));

    match drain(&mut rig.callbacks).as_slice() {
        [HostCallback::TimeChanged(time)] => {
            assert_eq!(time.timezone(), chrono_tz::Asia::Tokyo)
        }
        other => panic!("expected one time push, got {other:?}"),
    }

    rig.controller.set_time_zone(None);
    assert_eq!(rig.controller.current_time().offset().fix().local_minus_utc(), 0);
}

#[tokio::test]
async fn time_zone_ids_are_validated() {
    let rig = rig(false);
    rig.controller.set_time_zone_id(Some("Europe/Paris")).unwrap();
    assert_eq!(rig.controller.time_zone(), Some(chrono_tz::Europe::Paris));

    assert_eq!(
        rig.controller.set_time_zone_id(Some("Nowhere/Atlantis")),
        Err(WatchError::UnknownTimeZone("Nowhere/Atlantis".to_string()))
    );
    assert_eq!(rig.controller.time_zone(), Some(chrono_tz::Europe::Paris));

    rig.controller.set_time_zone_id(None).unwrap();
    assert_eq!(rig.controller.time_zone(), None);
}

#[tokio::test]
async fn formatted_time_uses_the_active_format() {
    let rig = rig(true);
    rig.controller.set_twenty_four_hour_pattern("'at' HH:mm").unwrap();

    let text = rig.controller.formatted_time();
    assert!(text.starts_with("at "), "{text}");
    assert_eq!(text.len(), "at 00:00".len());
}
