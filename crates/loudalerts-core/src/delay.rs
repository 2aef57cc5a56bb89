//! Snooze delay policy.
//!
//! Two pure computations used when a presented alert is snoozed:
//! - resolving a chosen [`SnoozeDelay`] into an absolute fire time, and
//! - computing which delays are worth offering given how long remains before
//!   the event starts ([`snooze_options`]).
//!
//! Start-relative delays are anchored to the event's immutable start time, so
//! resolving them twice yields the same instant no matter when it happens.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Delays relative to "now" that are always offered, in minutes.
pub const NOW_RELATIVE_MINUTES: [u32; 2] = [1, 5];

/// Delays relative to the event start, in minutes before start (0 = at start).
pub const START_RELATIVE_MINUTES: [u32; 3] = [5, 2, 0];

/// A snooze duration chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SnoozeDelay {
    /// Re-alert `minutes` after the snooze is requested.
    FromNow { minutes: u32 },
    /// Re-alert `minutes` before the event starts.
    BeforeStart { minutes: u32 },
}

impl SnoozeDelay {
    /// Shorthand for a now-relative delay.
    pub fn from_now(minutes: u32) -> Self {
        Self::FromNow { minutes }
    }

    /// Shorthand for a start-relative delay.
    pub fn before_start(minutes: u32) -> Self {
        Self::BeforeStart { minutes }
    }

    /// Shorthand for re-alerting exactly at start.
    pub fn at_start() -> Self {
        Self::BeforeStart { minutes: 0 }
    }

    /// Resolves this delay to an absolute fire time.
    pub fn fire_at(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::FromNow { minutes } => now + Duration::minutes(i64::from(minutes)),
            Self::BeforeStart { minutes } => start - Duration::minutes(i64::from(minutes)),
        }
    }

    /// Short button label.
    pub fn label(&self) -> String {
        match *self {
            Self::FromNow { minutes } => format!("{}m", minutes),
            Self::BeforeStart { minutes: 0 } => "At start".to_string(),
            Self::BeforeStart { minutes } => format!("{}m before", minutes),
        }
    }
}

impl fmt::Display for SnoozeDelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::FromNow { minutes } => write!(f, "{}m", minutes),
            Self::BeforeStart { minutes: 0 } => f.write_str("start"),
            Self::BeforeStart { minutes } => write!(f, "{}m-before", minutes),
        }
    }
}

/// Error returned when a snooze delay string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid snooze delay '{input}' (expected e.g. '5m', '5m-before' or 'start')")]
pub struct ParseSnoozeDelayError {
    input: String,
}

impl FromStr for SnoozeDelay {
    type Err = ParseSnoozeDelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSnoozeDelayError {
            input: s.to_string(),
        };
        let trimmed = s.trim().to_ascii_lowercase();

        if trimmed == "start" {
            return Ok(Self::at_start());
        }

        let (amount, before) = match trimmed.strip_suffix("-before") {
            Some(rest) => (rest, true),
            None => (trimmed.as_str(), false),
        };
        let minutes: u32 = amount
            .strip_suffix('m')
            .ok_or_else(err)?
            .parse()
            .map_err(|_| err())?;

        Ok(if before {
            Self::before_start(minutes)
        } else {
            Self::from_now(minutes)
        })
    }
}

/// Whole minutes until `start`, rounded up and clamped at zero.
pub fn minutes_until_start(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (start - now).num_milliseconds();
    if millis <= 0 {
        0
    } else {
        (millis + 59_999) / 60_000
    }
}

/// Returns the snooze delays worth offering.
///
/// The now-relative delays are always present. Each start-relative delay is
/// offered only while it still resolves to a moment strictly in the future,
/// so the list shrinks monotonically as the event approaches.
pub fn snooze_options(minutes_until_start: i64) -> Vec<SnoozeDelay> {
    let mut options: Vec<SnoozeDelay> = NOW_RELATIVE_MINUTES
        .iter()
        .map(|&m| SnoozeDelay::from_now(m))
        .collect();

    options.extend(
        START_RELATIVE_MINUTES
            .iter()
            .filter(|&&m| minutes_until_start - i64::from(m) > 0)
            .map(|&m| SnoozeDelay::before_start(m)),
    );

    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, min, s).unwrap()
    }

    mod fire_at {
        use super::*;

        #[test]
        fn now_relative_adds_to_now() {
            let delay = SnoozeDelay::from_now(5);
            assert_eq!(delay.fire_at(utc(10, 0, 0), utc(9, 30, 0)), utc(9, 35, 0));
        }

        #[test]
        fn start_relative_is_anchored_to_start() {
            let delay = SnoozeDelay::before_start(5);
            let start = utc(10, 0, 0);
            let first = delay.fire_at(start, utc(9, 30, 0));
            let second = delay.fire_at(start, utc(9, 47, 13));
            assert_eq!(first, utc(9, 55, 0));
            assert_eq!(first, second);
        }

        #[test]
        fn at_start_is_start() {
            let start = utc(10, 0, 0);
            assert_eq!(SnoozeDelay::at_start().fire_at(start, utc(9, 0, 0)), start);
        }
    }

    mod options {
        use super::*;

        #[test]
        fn far_event_offers_everything() {
            assert_eq!(
                snooze_options(30),
                vec![
                    SnoozeDelay::from_now(1),
                    SnoozeDelay::from_now(5),
                    SnoozeDelay::before_start(5),
                    SnoozeDelay::before_start(2),
                    SnoozeDelay::at_start(),
                ]
            );
        }

        #[test]
        fn degenerate_options_disappear_at_the_boundary() {
            // 5 minutes out: "5m before" would resolve to now.
            assert_eq!(
                snooze_options(5),
                vec![
                    SnoozeDelay::from_now(1),
                    SnoozeDelay::from_now(5),
                    SnoozeDelay::before_start(2),
                    SnoozeDelay::at_start(),
                ]
            );
            // 2 minutes out: only "At start" remains.
            assert_eq!(
                snooze_options(2),
                vec![
                    SnoozeDelay::from_now(1),
                    SnoozeDelay::from_now(5),
                    SnoozeDelay::at_start(),
                ]
            );
            assert_eq!(
                snooze_options(1),
                vec![
                    SnoozeDelay::from_now(1),
                    SnoozeDelay::from_now(5),
                    SnoozeDelay::at_start(),
                ]
            );
        }

        #[test]
        fn started_event_only_offers_now_relative() {
            assert_eq!(
                snooze_options(0),
                vec![SnoozeDelay::from_now(1), SnoozeDelay::from_now(5)]
            );
            assert_eq!(snooze_options(-3).len(), 2);
        }

        #[test]
        fn list_shrinks_monotonically() {
            let mut previous = usize::MAX;
            for minutes in (0..=10).rev() {
                let len = snooze_options(minutes).len();
                assert!(len <= previous, "grew at {} minutes", minutes);
                previous = len;
            }
        }

        #[test]
        fn offered_start_relative_options_resolve_in_the_future() {
            let now = utc(9, 0, 0);
            for seconds in [30, 59, 60, 61, 299, 300, 301, 900] {
                let start = now + Duration::seconds(seconds);
                for option in snooze_options(minutes_until_start(start, now)) {
                    if let SnoozeDelay::BeforeStart { .. } = option {
                        assert!(
                            option.fire_at(start, now) > now,
                            "{} offered {}s before start",
                            option,
                            seconds
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn minutes_until_start_rounds_up() {
        let now = utc(9, 0, 0);
        assert_eq!(minutes_until_start(utc(9, 0, 1), now), 1);
        assert_eq!(minutes_until_start(utc(9, 1, 0), now), 1);
        assert_eq!(minutes_until_start(utc(9, 1, 1), now), 2);
        assert_eq!(minutes_until_start(now, now), 0);
        assert_eq!(minutes_until_start(utc(8, 50, 0), now), 0);
    }

    #[test]
    fn parse_and_display() {
        for (text, delay) in [
            ("1m", SnoozeDelay::from_now(1)),
            ("5m", SnoozeDelay::from_now(5)),
            ("5m-before", SnoozeDelay::before_start(5)),
            ("start", SnoozeDelay::at_start()),
        ] {
            assert_eq!(text.parse::<SnoozeDelay>().unwrap(), delay);
            assert_eq!(delay.to_string(), text);
        }
        assert_eq!(
            " 10M ".parse::<SnoozeDelay>().unwrap(),
            SnoozeDelay::from_now(10)
        );
        assert!("soon".parse::<SnoozeDelay>().is_err());
        assert!("m".parse::<SnoozeDelay>().is_err());
        assert!("-5m".parse::<SnoozeDelay>().is_err());
    }

    #[test]
    fn labels() {
        assert_eq!(SnoozeDelay::from_now(5).label(), "5m");
        assert_eq!(SnoozeDelay::before_start(2).label(), "2m before");
        assert_eq!(SnoozeDelay::at_start().label(), "At start");
    }

    #[test]
    fn serde_tagged() {
        let json = serde_json::to_string(&SnoozeDelay::before_start(5)).unwrap();
        assert_eq!(json, r#"{"kind":"before_start","minutes":5}"#);
    }
}
