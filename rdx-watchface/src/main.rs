use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::info;
use tracing_subscriber::EnvFilter;
use watchface::prelude::*;
use watchface::CONTROLLER_NAME;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // 2. Load the configuration: an optional TOML path, then WATCHFACE_* overrides.
    let config_path = std::env::args().nth(1);
    let config = WatchConfig::load(config_path.as_deref())?;

    // 3. Build the collaborators: the dispatch queue, clock, wake scheduler and host.
    let queue = DispatchQueue::spawn();
    let clock = Arc::new(SystemClock::new(config.system_time_zone));
    let wake = Arc::new(TokioWakeScheduler::new(clock.notification_sender()));
    let (host, callbacks) = ChannelHost::new(config.environment(), queue.clone());
    host.set_seconds_in_dim_mode(config.seconds_in_dim_mode);
    host.set_edit_mode(config.edit_mode);

    // 4. Bind the controller and install the configured patterns.
    let controller = TimeController::new(Arc::downgrade(&host), clock.clone(), wake)?;
    config.apply(&controller)?;

    let (shutdown_tx, _) = broadcast::channel(1);
    clock.spawn_minute_ticker(shutdown_tx.subscribe());

    // 5. Attach on the host's queue and render until Ctrl+C.
    let attaching = controller.clone();
    queue.post(move || attaching.attach());
    info!(
        "{} running with format {}. Press Ctrl+C to stop.",
        CONTROLLER_NAME.cyan(),
        controller.format().pattern().yellow()
    );
    render_until_shutdown(&controller, callbacks).await?;

    let detaching = controller.clone();
    queue.post(move || detaching.detach());
    shutdown_tx.send(()).ok();
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!("{} stopped.", CONTROLLER_NAME);
    Ok(())
}

/// Prints every host callback until a Ctrl+C signal arrives.
async fn render_until_shutdown(
    controller: &TimeController,
    mut callbacks: mpsc::UnboundedReceiver<HostCallback>,
) -> Result<()> {
    loop {
        tokio::select! {
            biased;
            signal = tokio::signal::ctrl_c() => {
                signal?;
                return Ok(());
            }
            Some(callback) = callbacks.recv() => match callback {
                HostCallback::TimeChanged(time) => {
                    let text = controller.format().render(&time);
                    println!("{} {}", text.bold(), time.timezone().name().dimmed());
                }
                HostCallback::BatteryLevelChanged(level) => {
                    println!("{} {}%", "battery".green(), level);
                }
                HostCallback::ActiveStateChanged(active) => {
                    println!("{} {}", "active".blue(), active);
                }
            },
        }
    }
}
