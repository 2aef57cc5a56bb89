//! Desktop notification sink.
//!
//! Presents fired alerts as critical desktop notifications. On Linux each
//! notification carries snooze buttons taken from the delay policy; a click
//! comes back as a [`SnoozeRequest`] on the channel returned by
//! [`DesktopSink::new`].

use std::time::Duration;

use chrono::{DateTime, Local, Utc};
use notify_rust::{Notification, Timeout};
#[cfg(target_os = "linux")]
use notify_rust::Urgency;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use loudalerts_core::{EventSnapshot, SnoozeDelay, minutes_until_start, snooze_options};

use crate::config::AlertSettings;
use crate::sink::{AlertSink, SnoozeRequest};

/// Configuration for desktop notifications.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    /// Application name for notifications.
    pub app_name: String,
    /// Seconds before the notification expires. 0 keeps it until dismissed.
    pub timeout_secs: u32,
    /// Custom notification icon path.
    pub icon_path: Option<String>,
    /// Freedesktop sound name played when `play_sound` is set.
    pub sound_name: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            app_name: "loudalerts".to_string(),
            timeout_secs: 0,
            icon_path: None,
            sound_name: "message-new-instant".to_string(),
        }
    }
}

impl NotifyConfig {
    /// Builder: set app name.
    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Builder: set timeout.
    pub fn with_timeout(mut self, secs: u32) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Builder: set icon path.
    pub fn with_icon_path(mut self, path: impl Into<String>) -> Self {
        self.icon_path = Some(path.into());
        self
    }

    /// Builder: set sound name.
    pub fn with_sound_name(mut self, name: impl Into<String>) -> Self {
        self.sound_name = name.into();
        self
    }

    fn timeout(&self) -> Timeout {
        if self.timeout_secs == 0 {
            Timeout::Never
        } else {
            Timeout::from(Duration::from_secs(self.timeout_secs as u64))
        }
    }
}

/// Returns true if `event` should be shown under `settings`.
pub fn should_present(settings: &AlertSettings, event: &EventSnapshot) -> bool {
    if !settings.alerts_enabled {
        debug!(event_id = %event.id, "Alerts disabled, not presenting");
        return false;
    }
    if event.is_all_day && settings.skip_all_day_events {
        debug!(event_id = %event.id, "Skipping all-day event");
        return false;
    }
    true
}

/// Notification headline.
pub fn alert_summary(event: &EventSnapshot, now: DateTime<Utc>) -> String {
    match minutes_until_start(event.start, now) {
        0 => format!("Now: {}", event.title),
        1 => format!("In 1 minute: {}", event.title),
        m => format!("In {} minutes: {}", m, event.title),
    }
}

/// Notification body: local time range and location.
pub fn alert_body(event: &EventSnapshot) -> String {
    let start = event.start.with_timezone(&Local).format("%H:%M");
    let end = event.end.with_timezone(&Local).format("%H:%M");
    match &event.location {
        Some(location) if !location.is_empty() => format!("{} - {}\n{}", start, end, location),
        _ => format!("{} - {}", start, end),
    }
}

/// Snooze buttons as (action id, label) pairs.
///
/// The action id is the [`SnoozeDelay`] in its textual form so a click
/// parses straight back into a delay.
pub fn snooze_actions(event: &EventSnapshot, now: DateTime<Utc>) -> Vec<(String, String)> {
    snooze_options(minutes_until_start(event.start, now))
        .into_iter()
        .map(|delay| (delay.to_string(), delay.label()))
        .collect()
}

/// Sink showing alerts as desktop notifications.
pub struct DesktopSink {
    config: NotifyConfig,
    settings: watch::Receiver<AlertSettings>,
    snooze_tx: mpsc::UnboundedSender<SnoozeRequest>,
}

impl DesktopSink {
    /// Creates a sink and the receiver of snooze button clicks.
    pub fn new(
        config: NotifyConfig,
        settings: watch::Receiver<AlertSettings>,
    ) -> (Self, mpsc::UnboundedReceiver<SnoozeRequest>) {
        let (snooze_tx, snooze_rx) = mpsc::unbounded_channel();
        (
            Self {
                config,
                settings,
                snooze_tx,
            },
            snooze_rx,
        )
    }

    fn build(
        &self,
        event: &EventSnapshot,
        settings: &AlertSettings,
        now: DateTime<Utc>,
    ) -> Notification {
        let mut notification = Notification::new();
        notification
            .appname(&self.config.app_name)
            .summary(&alert_summary(event, now))
            .body(&alert_body(event))
            .timeout(self.config.timeout());

        if let Some(ref icon) = self.config.icon_path {
            notification.icon(icon);
        }

        #[cfg(target_os = "linux")]
        {
            notification.urgency(Urgency::Critical);
            if settings.play_sound {
                notification.sound_name(&self.config.sound_name);
            }
            for (id, label) in snooze_actions(event, now) {
                notification.action(&id, &label);
            }
        }
        #[cfg(not(target_os = "linux"))]
        let _ = settings;

        notification
    }
}

impl AlertSink for DesktopSink {
    fn alert_fired(&self, event: &EventSnapshot) {
        let settings = self.settings.borrow().clone();
        if !should_present(&settings, event) {
            return;
        }

        let notification = self.build(event, &settings, Utc::now());
        let event_id = event.id.clone();
        let snooze_tx = self.snooze_tx.clone();

        // Showing and waiting for a click both block.
        let spawned = std::thread::Builder::new()
            .name("loudalerts-notify".to_string())
            .spawn(move || present(notification, event_id, snooze_tx));
        if let Err(e) = spawned {
            error!(error = %e, event_id = %event.id, "Failed to spawn notification thread");
        }
    }

    fn dismiss(&self, event_id: &str) {
        // The notification server closes a notification when one of its
        // actions is invoked.
        debug!(event_id, "Dismissing alert");
    }
}

fn present(
    notification: Notification,
    event_id: String,
    snooze_tx: mpsc::UnboundedSender<SnoozeRequest>,
) {
    match notification.show() {
        Ok(handle) => {
            info!(event_id = %event_id, "Notification shown");

            #[cfg(target_os = "linux")]
            handle.wait_for_action(|action| match action.parse::<SnoozeDelay>() {
                Ok(delay) => {
                    if snooze_tx.send(SnoozeRequest::new(&event_id, delay)).is_err() {
                        debug!(event_id = %event_id, "Snooze receiver dropped");
                    }
                }
                Err(_) => debug!(event_id = %event_id, action, "Notification closed"),
            });
            #[cfg(not(target_os = "linux"))]
            let _ = (handle, snooze_tx);
        }
        Err(e) => {
            error!(error = %e, event_id = %event_id, "Failed to show notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
    }

    fn event_in(minutes: i64) -> EventSnapshot {
        let start = now() + ChronoDuration::minutes(minutes);
        EventSnapshot::new("evt-1", "Design review", start, start + ChronoDuration::hours(1))
    }

    #[test]
    fn config_defaults() {
        let config = NotifyConfig::default();
        assert_eq!(config.app_name, "loudalerts");
        assert_eq!(config.timeout_secs, 0);
        assert!(matches!(config.timeout(), Timeout::Never));
        assert!(matches!(
            config.with_timeout(5).timeout(),
            Timeout::Milliseconds(5000)
        ));
    }

    #[test]
    fn presentation_filters() {
        let settings = AlertSettings::default();
        assert!(should_present(&settings, &event_in(5)));
        assert!(!should_present(&settings, &event_in(5).with_all_day(true)));

        let keep_all_day = AlertSettings::default().with_skip_all_day(false);
        assert!(should_present(&keep_all_day, &event_in(5).with_all_day(true)));

        let disabled = AlertSettings::default().with_alerts_enabled(false);
        assert!(!should_present(&disabled, &event_in(5)));
    }

    #[test]
    fn summary_text() {
        assert_eq!(alert_summary(&event_in(10), now()), "In 10 minutes: Design review");
        assert_eq!(alert_summary(&event_in(1), now()), "In 1 minute: Design review");
        assert_eq!(alert_summary(&event_in(0), now()), "Now: Design review");
        assert_eq!(alert_summary(&event_in(-3), now()), "Now: Design review");
    }

    #[test]
    fn body_includes_location() {
        assert!(!alert_body(&event_in(5)).contains('\n'));
        let body = alert_body(&event_in(5).with_location("Room 4"));
        assert!(body.ends_with("\nRoom 4"));
    }

    #[test]
    fn actions_round_trip_through_delay_parser() {
        let actions = snooze_actions(&event_in(10), now());
        let ids: Vec<&str> = actions.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1m", "5m", "5m-before", "2m-before", "start"]);

        for (id, _) in &actions {
            assert!(id.parse::<SnoozeDelay>().is_ok(), "{} does not parse", id);
        }
    }

    #[test]
    fn started_events_only_offer_now_relative_actions() {
        let actions = snooze_actions(&event_in(-2), now());
        assert_eq!(actions.len(), 2);
    }
}
