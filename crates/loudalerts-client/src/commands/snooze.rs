//! Snooze options command.

use chrono::{DateTime, Local, TimeDelta, Utc};

use loudalerts_core::snooze_options;

use crate::error::{ClientError, ClientResult};

/// One offered snooze choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeChoice {
    /// Action id, e.g. `5m-before`.
    pub id: String,
    /// Button label.
    pub label: String,
    /// When the alert would come back.
    pub fires_at: DateTime<Utc>,
}

/// Lists the snooze choices for an event starting `minutes` after `now`.
pub fn choices(minutes: i64, now: DateTime<Utc>) -> ClientResult<Vec<SnoozeChoice>> {
    let start = TimeDelta::try_minutes(minutes)
        .and_then(|offset| now.checked_add_signed(offset))
        .ok_or_else(|| {
            ClientError::invalid_argument(format!("--minutes {} is out of range", minutes))
        })?;
    Ok(snooze_options(minutes.max(0))
        .into_iter()
        .map(|delay| SnoozeChoice {
            id: delay.to_string(),
            label: delay.label(),
            fires_at: delay.fire_at(start, now),
        })
        .collect())
}

/// Prints the snooze choices.
pub fn print(minutes: i64) -> ClientResult<()> {
    for choice in choices(minutes, Utc::now())? {
        println!(
            "{:<10} {:<12} {}",
            choice.id,
            choice.label,
            choice.fires_at.with_timezone(&Local).format("%H:%M:%S")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
    }

    #[test]
    fn ten_minutes_out() {
        let ids: Vec<String> = choices(10, now())
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec!["1m", "5m", "5m-before", "2m-before", "start"]);
    }

    #[test]
    fn choices_resolve_in_the_future() {
        for minutes in [1, 2, 5, 6, 30] {
            for choice in choices(minutes, now()).unwrap() {
                assert!(choice.fires_at > now(), "{} at {}m", choice.id, minutes);
            }
        }
    }

    #[test]
    fn started_event_only_offers_now_relative() {
        let choices = choices(-4, now()).unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(choices[1].fires_at, now() + TimeDelta::minutes(5));
    }

    #[test]
    fn huge_minutes_are_rejected() {
        for minutes in [i64::MAX, i64::MIN, 9_000_000_000_000] {
            let err = choices(minutes, now()).unwrap_err();
            assert!(matches!(err, ClientError::InvalidArgument(_)), "{}", minutes);
        }
    }
}
