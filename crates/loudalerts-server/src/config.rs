//! Alert settings shared between the engine, the poller and delivery sinks.
//!
//! Settings live in a [`tokio::sync::watch`] channel: the daemon publishes a
//! new value on reload and every consumer reads the latest one at decision
//! time without caching it.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::engine::ReminderSource;

/// User-facing alert settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    /// Master switch for presenting alerts.
    pub alerts_enabled: bool,
    /// Reminder applied to events without alarms, in minutes before start.
    /// `None` leaves alarmless events silent.
    pub default_reminder_minutes: Option<u32>,
    /// Skip presenting all-day events.
    pub skip_all_day_events: bool,
    /// Ask the notification server to play a sound.
    pub play_sound: bool,
    /// Calendar ids whose events are ignored.
    pub disabled_calendars: Vec<String>,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            alerts_enabled: true,
            default_reminder_minutes: None,
            skip_all_day_events: true,
            play_sound: true,
            disabled_calendars: Vec::new(),
        }
    }
}

impl AlertSettings {
    /// Builder: set the default reminder.
    pub fn with_default_reminder(mut self, minutes: Option<u32>) -> Self {
        self.default_reminder_minutes = minutes;
        self
    }

    /// Builder: enable or disable alerts.
    pub fn with_alerts_enabled(mut self, enabled: bool) -> Self {
        self.alerts_enabled = enabled;
        self
    }

    /// Builder: skip all-day events.
    pub fn with_skip_all_day(mut self, skip: bool) -> Self {
        self.skip_all_day_events = skip;
        self
    }

    /// Builder: set disabled calendars.
    pub fn with_disabled_calendars(mut self, calendars: Vec<String>) -> Self {
        self.disabled_calendars = calendars;
        self
    }

    /// Returns true if events from `calendar_id` should be considered.
    pub fn is_calendar_enabled(&self, calendar_id: &str) -> bool {
        !self.disabled_calendars.iter().any(|c| c == calendar_id)
    }
}

/// Publisher side of the shared settings.
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: watch::Sender<AlertSettings>,
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(AlertSettings::default())
    }
}

impl SettingsHandle {
    /// Creates a handle holding `initial`.
    pub fn new(initial: AlertSettings) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Returns a receiver that always observes the latest settings.
    pub fn subscribe(&self) -> watch::Receiver<AlertSettings> {
        self.tx.subscribe()
    }

    /// Returns a copy of the current settings.
    pub fn current(&self) -> AlertSettings {
        self.tx.borrow().clone()
    }

    /// Publishes new settings. Returns true if anything changed.
    pub fn update(&self, settings: AlertSettings) -> bool {
        let changed = *self.tx.borrow() != settings;
        self.tx.send_replace(settings);
        changed
    }
}

impl ReminderSource for watch::Receiver<AlertSettings> {
    fn default_reminder_minutes(&self) -> Option<u32> {
        self.borrow().default_reminder_minutes
    }
}
