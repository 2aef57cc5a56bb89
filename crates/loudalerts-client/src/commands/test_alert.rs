//! Test alert command: fires a demo alert through the real delivery path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use loudalerts_core::EventSnapshot;
use loudalerts_server::{
    AlertEvent, AlertService, ChannelSink, DesktopSink, MultiSink, SettingsHandle,
};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Shows a demo alert, then reports snoozes and re-deliveries for `wait`
/// seconds.
pub async fn run(config: &ClientConfig, wait: u64) -> ClientResult<()> {
    let settings = SettingsHandle::new(config.alerts.clone().with_alerts_enabled(true));

    let (desktop, snooze_rx) =
        DesktopSink::new(config.notifications.to_notify_config(), settings.subscribe());
    let (channel, mut alerts) = ChannelSink::new();
    let sink = MultiSink::new().with(desktop).with(channel);

    let service =
        AlertService::new(Arc::new(sink), settings.subscribe()).with_snooze_requests(snooze_rx);
    let engine = service.handle();
    let task = tokio::spawn(service.run());

    let event = EventSnapshot::test_event(Utc::now());
    engine.reconcile(vec![event]).await?;

    let deadline = Instant::now() + Duration::from_secs(wait);
    while let Ok(Some(alert)) = tokio::time::timeout_at(deadline, alerts.recv()).await {
        match alert {
            AlertEvent::Fired(e) => println!("alert: {}", e.title),
            AlertEvent::Dismissed(id) => {
                if let Ok(status) = engine.status().await {
                    let until = status
                        .next_deadline
                        .map(|at| at.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "now".to_string());
                    println!("snoozed {} until {}", id, until);
                }
            }
        }
    }

    engine.stop().await?;
    let _ = task.await;
    Ok(())
}
