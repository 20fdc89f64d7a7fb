use anyhow::Result;
use chrono_tz::Tz;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use watchface::prelude::*;
use watchface::{CONTROLLER_NAME, VERSION as LIB_VERSION};

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Colors the command word and its arguments as they are typed.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        match line.split_once(' ') {
            Some((command, rest)) => Cow::Owned(format!("{} {}", command.yellow().bold(), rest.yellow())),
            None => Cow::Owned(line.yellow().bold().to_string()),
        }
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", "  watchshell :: drive a watchface time controller by hand".cyan());
    println!("{}", "-".repeat(64).dimmed());
    println!("  Shell   v{:<8} Library   v{:<8}", SHELL_VERSION, LIB_VERSION);
    println!("{}", "-".repeat(64).dimmed());
}

/// Prints host callbacks as they arrive. Time pushes are only shown while
/// `show_time` is set, since a seconds-bearing format pushes every second.
fn spawn_callback_printer(mut callbacks: mpsc::UnboundedReceiver<HostCallback>, show_time: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while let Some(callback) = callbacks.recv().await {
            match callback {
                HostCallback::TimeChanged(time) => {
                    if show_time.load(Ordering::Relaxed) {
                        println!("<-- [TIME] {}", time.format("%Y-%m-%d %H:%M:%S %Z"));
                    }
                }
                HostCallback::BatteryLevelChanged(level) => {
                    println!("<-- [BATTERY] {}%", level);
                }
                HostCallback::ActiveStateChanged(active) => {
                    println!("<-- [ACTIVE] {}", active);
                }
            }
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HourSlot {
    Twelve,
    TwentyFour,
}

/// Validates `pattern` here, then installs it on the controller's queue.
fn post_pattern(
    queue: &DispatchQueue,
    controller: &TimeController,
    slot: HourSlot,
    pattern: &str,
) -> Result<(), WatchError> {
    DisplayFormat::parse(pattern, &DisplayLocale::default())?;
    let controller = controller.clone();
    let pattern = pattern.to_string();
    queue.post(move || {
        let result = match slot {
            HourSlot::Twelve => controller.set_twelve_hour_pattern(&pattern),
            HourSlot::TwentyFour => controller.set_twenty_four_hour_pattern(&pattern),
        };
        if let Err(e) = result {
            warn!("Pattern '{}' rejected: {}", pattern, e);
        }
    });
    Ok(())
}

fn post_time_zone(queue: &DispatchQueue, controller: &TimeController, zone: Option<Tz>) {
    let controller = controller.clone();
    queue.post(move || controller.set_time_zone(zone));
}

fn parse_switch(arg: Option<&&str>) -> Option<bool> {
    match arg.copied() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

fn print_status(controller: &TimeController, wake: &TokioWakeScheduler) {
    let snapshot = controller.snapshot();
    println!("Controller:");
    println!("  state          {}", snapshot.attachment);
    println!("  pattern        {}", snapshot.pattern);
    println!("  seconds        {}", snapshot.includes_seconds);
    println!("  24-hour mode   {}", controller.is_24_hour_mode_enabled());
    println!("  subscriptions  {}", snapshot.subscriptions);
    println!("  ticker armed   {}", snapshot.tick_scheduled);
    println!("  wake request   {:?}", snapshot.wake_request);
    println!("  wake timers    {}", wake.active_requests());
    match snapshot.time_zone {
        Some(zone) => println!("  time zone      {} (override)", zone.name()),
        None => println!("  time zone      system"),
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  attach                - Attaches the controller to the host.");
    println!("  detach                - Detaches the controller.");
    println!("  12h <PATTERN>         - Sets the 12-hour pattern (e.g. 'h:mm:ss a').");
    println!("  24h <PATTERN>         - Sets the 24-hour pattern (e.g. 'HH:mm').");
    println!("  mode 12|24            - Flips the host's 24-hour setting and announces it.");
    println!("  tz <ZONE>|system      - Pins the controller to a zone, or follows the system.");
    println!("  zone <ZONE>           - Simulates a system time zone change.");
    println!("  notify tick|changed|keepawake");
    println!("                        - Publishes a system notification.");
    println!("  battery <LEVEL>       - Publishes a battery level change.");
    println!("  dim on|off            - Toggles seconds in dim mode.");
    println!("  edit on|off           - Toggles the host's edit mode.");
    println!("  start time            - Begins printing time pushes.");
    println!("  stop time             - Stops printing time pushes.");
    println!("  now                   - Renders the current time with the active format.");
    println!("  status                - Shows the controller's state.");
    println!("  exit                  - Quits the shell.");
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let queue = DispatchQueue::spawn();
    let clock = Arc::new(SystemClock::new(chrono_tz::UTC));
    let wake = Arc::new(TokioWakeScheduler::new(clock.notification_sender()));
    let (host, callbacks) = ChannelHost::new(HostEnvironment::default(), queue.clone());
    let controller = TimeController::new(Arc::downgrade(&host), clock.clone(), wake.clone())?;

    let (shutdown_tx, _) = broadcast::channel(1);
    clock.spawn_minute_ticker(shutdown_tx.subscribe());

    let show_time = Arc::new(AtomicBool::new(false));
    spawn_callback_printer(callbacks, show_time.clone());

    info!("{} ready. Type 'help' for commands or 'exit' to quit.", CONTROLLER_NAME.cyan());

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting watchshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "attach" => {
                let attaching = controller.clone();
                queue.post(move || attaching.attach());
                println!("--> Attach posted.");
            }
            "detach" => {
                let detaching = controller.clone();
                queue.post(move || detaching.detach());
                println!("--> Detach posted.");
            }
            "12h" | "24h" => {
                let pattern = line.trim_start()[command.len()..].trim();
                if pattern.is_empty() {
                    println!("Usage: {} <PATTERN>", command);
                    continue;
                }
                let slot = if *command == "12h" { HourSlot::Twelve } else { HourSlot::TwentyFour };
                match post_pattern(&queue, &controller, slot, pattern) {
                    Ok(()) => println!("--> {} pattern '{}' posted.", command, pattern),
                    Err(e) => println!("Error: {}", e),
                }
            }
            "mode" => {
                let use_24_hour = match args.get(1) {
                    Some(&"12") => false,
                    Some(&"24") => true,
                    _ => {
                        println!("Usage: mode 12|24");
                        continue;
                    }
                };
                host.set_use_24_hour(use_24_hour);
                clock.publish_settings_change(SettingsChange::key("time_12_24"));
                println!("--> Host switched to {}-hour time.", if use_24_hour { 24 } else { 12 });
            }
            "tz" => match args.get(1) {
                Some(&"system") => {
                    post_time_zone(&queue, &controller, None);
                    println!("--> Following the system time zone.");
                }
                Some(id) => match id.parse::<Tz>() {
                    Ok(zone) => {
                        post_time_zone(&queue, &controller, Some(zone));
                        println!("--> Pinned to {}.", zone.name());
                    }
                    Err(_) => println!("Error: unknown time zone '{}'.", id),
                },
                None => println!("Usage: tz <ZONE>|system"),
            },
            "zone" => match args.get(1).map(|id| id.parse::<Tz>()) {
                Some(Ok(zone)) => {
                    clock.publish(Notification::TimeZoneChanged { zone });
                    println!("--> System time zone changed to {}.", zone.name());
                }
                Some(Err(_)) => println!("Error: unknown time zone '{}'.", args[1]),
                None => println!("Usage: zone <ZONE>"),
            },
            "notify" => {
                let notification = match args.get(1) {
                    Some(&"tick") => Notification::TimeTick,
                    Some(&"changed") => Notification::TimeChanged,
                    Some(&"keepawake") => Notification::KeepAwake,
                    _ => {
                        println!("Usage: notify tick|changed|keepawake");
                        continue;
                    }
                };
                clock.publish(notification);
            }
            "battery" => match args.get(1).map(|level| level.parse::<u8>()) {
                Some(Ok(level)) => clock.publish(Notification::BatteryChanged { level }),
                _ => println!("Usage: battery <0-100>"),
            },
            "dim" => match parse_switch(args.get(1)) {
                Some(enabled) => {
                    host.set_seconds_in_dim_mode(enabled);
                    println!("--> Seconds in dim mode: {}. Takes effect on the next attach.", enabled);
                }
                None => println!("Usage: dim on|off"),
            },
            "edit" => match parse_switch(args.get(1)) {
                Some(enabled) => {
                    host.set_edit_mode(enabled);
                    println!("--> Edit mode: {}. Takes effect on the next attach.", enabled);
                }
                None => println!("Usage: edit on|off"),
            },
            "start" | "stop" => {
                if let Some(&"time") = args.get(1) {
                    let start = *command == "start";
                    show_time.store(start, Ordering::Relaxed);
                    println!("--> {} printing time pushes.", if start { "Started" } else { "Stopped" });
                } else {
                    println!("Unknown '{}' command. Try '{} time'.", command, command);
                }
            }
            "now" => println!("{}", controller.formatted_time().bold()),
            "status" => print_status(&controller, &wake),
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line),
        }
    }

    let detaching = controller.clone();
    queue.post(move || detaching.detach());
    shutdown_tx.send(()).ok();
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(())
}
