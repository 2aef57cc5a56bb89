//! Event snapshot model.
//!
//! An [`EventSnapshot`] is the immutable view of one calendar occurrence as
//! produced by a single poll of the calendar. Every refresh supplies a brand
//! new list of snapshots; nothing here is ever mutated in place.
//!
//! Two snapshots with the same `id` are the *same tracked event*: equality and
//! hashing look at the id only, so a changed title or start time on an
//! existing id is an update rather than a new event.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Duration, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A single calendar occurrence together with its alarm configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSnapshot {
    /// Stable identifier, unique per distinct calendar occurrence.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Start of the event.
    pub start: DateTime<Utc>,
    /// End of the event.
    pub end: DateTime<Utc>,
    /// Whether this is an all-day event.
    #[serde(default)]
    pub is_all_day: bool,
    /// Whether the source calendar entry carries explicit alarms.
    #[serde(default)]
    pub has_alarms: bool,
    /// Alarm offsets in seconds relative to `start` (usually zero or negative).
    #[serde(default)]
    pub alarm_offsets: Vec<i64>,
    /// Calendar this event belongs to.
    #[serde(default)]
    pub calendar_id: String,
    /// Free-form location, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl EventSnapshot {
    /// Creates a snapshot without alarms.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start,
            end,
            is_all_day: false,
            has_alarms: false,
            alarm_offsets: Vec::new(),
            calendar_id: String::new(),
            location: None,
        }
    }

    /// Builder method to set alarm offsets (seconds relative to start).
    ///
    /// `has_alarms` follows whether any offset was given.
    pub fn with_alarm_offsets(mut self, offsets: Vec<i64>) -> Self {
        self.has_alarms = !offsets.is_empty();
        self.alarm_offsets = offsets;
        self
    }

    /// Builder method to mark as all-day.
    pub fn with_all_day(mut self, is_all_day: bool) -> Self {
        self.is_all_day = is_all_day;
        self
    }

    /// Builder method to set the calendar id.
    pub fn with_calendar_id(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = calendar_id.into();
        self
    }

    /// Builder method to set the location.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns true if the event starts strictly after `now`.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.start > now
    }

    /// Returns true if `now` falls within `[start, end)`.
    pub fn is_happening_now(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && self.end > now
    }

    /// Time remaining until the event starts. Negative once started.
    pub fn time_until_start(&self, now: DateTime<Utc>) -> Duration {
        self.start - now
    }

    /// Returns the alarm offsets the engine should honour.
    ///
    /// Events with explicit alarms use them verbatim. Alarmless events get a
    /// single `-minutes` offset when a default reminder is configured and are
    /// non-alerting (empty result) otherwise. Offsets too large to represent
    /// are dropped.
    pub fn effective_alarm_offsets(&self, default_reminder_minutes: Option<u32>) -> Vec<Duration> {
        if self.has_alarms {
            self.alarm_offsets
                .iter()
                .filter_map(|&secs| {
                    let offset = TimeDelta::try_seconds(secs);
                    if offset.is_none() {
                        warn!(
                            event_id = %self.id,
                            offset_secs = secs,
                            "Ignoring out of range alarm offset"
                        );
                    }
                    offset
                })
                .collect()
        } else {
            default_reminder_minutes
                .and_then(|minutes| TimeDelta::try_minutes(-i64::from(minutes)))
                .map(|offset| vec![offset])
                .unwrap_or_default()
        }
    }

    /// Absolute fire times for every effective alarm offset.
    ///
    /// Offsets that would push the fire time outside the representable range
    /// are skipped.
    pub fn fire_times(&self, default_reminder_minutes: Option<u32>) -> Vec<DateTime<Utc>> {
        self.effective_alarm_offsets(default_reminder_minutes)
            .into_iter()
            .filter_map(|offset| {
                let at = self.start.checked_add_signed(offset);
                if at.is_none() {
                    warn!(
                        event_id = %self.id,
                        offset_secs = offset.num_seconds(),
                        "Alarm time out of range, skipping"
                    );
                }
                at
            })
            .collect()
    }

    /// A demo event starting one minute from `now` with a five minute alarm.
    pub fn test_event(now: DateTime<Utc>) -> Self {
        Self::new(
            format!("test-{}", now.timestamp_millis()),
            "Test Meeting - Loud Alerts Demo",
            now + Duration::seconds(60),
            now + Duration::seconds(3660),
        )
        .with_alarm_offsets(vec![-300])
        .with_calendar_id("test")
        .with_location("https://meet.example.com/loud-alerts-demo")
    }
}

impl PartialEq for EventSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventSnapshot {}

impl Hash for EventSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}
