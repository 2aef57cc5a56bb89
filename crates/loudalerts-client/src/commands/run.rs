//! Run command: the alert daemon in the foreground.
//!
//! Wires the components together:
//! - Signal handler (SIGTERM/SIGINT for shutdown, SIGHUP for reload)
//! - Desktop sink and alert service
//! - Poller reading the event file

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use loudalerts_server::{AlertService, DesktopSink, Poller, PollerHandle, SettingsHandle, SignalHandler};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::source::FileEventSource;

/// Options for the run command.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Event file to poll.
    pub events: PathBuf,
    /// Poll interval override, in seconds.
    pub interval: Option<u64>,
    /// Config file re-read on SIGHUP; default location when `None`.
    pub config_path: Option<PathBuf>,
}

/// Runs the daemon until SIGTERM or SIGINT.
pub async fn run(config: &ClientConfig, options: RunOptions) -> ClientResult<()> {
    for warning in config.validate()? {
        warn!("{}", warning);
    }

    let settings = SettingsHandle::new(config.alerts.clone());

    // 1. Signal handler
    let signals = SignalHandler::new();
    signals.spawn_listener()?;
    let shutdown = signals.shutdown_handle();
    let mut reloads = signals.reloads();

    // 2. Engine delivering to the desktop
    let (desktop, snooze_rx) =
        DesktopSink::new(config.notifications.to_notify_config(), settings.subscribe());
    let service =
        AlertService::new(Arc::new(desktop), settings.subscribe()).with_snooze_requests(snooze_rx);
    let engine = service.handle();
    let engine_task = tokio::spawn(service.run());

    // 3. Poller
    let (lookback, lookahead) = config.polling.window();
    let source =
        FileEventSource::new(&options.events, settings.subscribe()).with_window(lookback, lookahead);
    let mut poller_config = config.polling.to_poller_config();
    if let Some(secs) = options.interval {
        poller_config.poll_interval = Duration::from_secs(secs.max(1));
    }
    let poller = Poller::new(poller_config, Arc::new(source), engine.clone());
    let poller_handle = poller.handle();
    let poller_task = tokio::spawn(poller.run());

    info!(events = %options.events.display(), "Alert daemon running");

    loop {
        tokio::select! {
            _ = shutdown.wait() => break,
            reloaded = reloads.recv() => {
                if !reloaded {
                    shutdown.wait().await;
                    break;
                }
                reload(options.config_path.as_deref(), &settings, &poller_handle).await;
            }
        }
    }

    // Clean shutdown: poller first so nothing reconciles into a stopped engine.
    info!("Shutting down...");
    if let Err(e) = poller_handle.stop().await {
        warn!(error = %e, "Failed to send stop command to poller");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), poller_task).await;

    if let Err(e) = engine.stop().await {
        warn!(error = %e, "Failed to stop alert engine");
    }
    let _ = tokio::time::timeout(Duration::from_secs(5), engine_task).await;

    info!("Alert daemon stopped");
    Ok(())
}

/// Re-reads the config file, publishes the alert settings, resyncs.
///
/// Polling and notification settings only apply after a restart.
async fn reload(path: Option<&Path>, settings: &SettingsHandle, poller: &PollerHandle) {
    match ClientConfig::resolve(path) {
        Ok(config) => {
            if settings.update(config.alerts) {
                info!("Alert settings reloaded");
            } else {
                debug!("Alert settings unchanged");
            }
            if let Err(e) = poller.sync_now().await {
                warn!(error = %e, "Failed to trigger sync after reload");
            }
        }
        Err(e) => warn!(error = %e, "Reload failed, keeping current settings"),
    }
}
