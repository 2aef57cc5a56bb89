//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/loudalerts/config.toml` by default. Every section is optional.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use loudalerts_server::{AlertSettings, GRACE_PERIOD_SECS, NotifyConfig, PollerConfig};

use crate::error::{ClientError, ClientResult};

/// Configuration for the loudalerts client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Alert behaviour, published to the engine and sinks.
    pub alerts: AlertSettings,

    /// Polling settings.
    pub polling: PollingSettings,

    /// Desktop notification settings.
    pub notifications: NotificationSettings,
}

/// Polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    /// Seconds between polls.
    pub interval_secs: u64,
    /// How far back, in minutes, fetched events may have started.
    pub lookback_minutes: i64,
    /// How far ahead, in hours, events are fetched.
    pub lookahead_hours: i64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            lookback_minutes: 60,
            lookahead_hours: 24,
        }
    }
}

impl PollingSettings {
    /// Builds the poller configuration.
    pub fn to_poller_config(&self) -> PollerConfig {
        PollerConfig::new(Duration::from_secs(self.interval_secs))
    }

    /// Fetch window as (lookback, lookahead).
    pub fn window(&self) -> (chrono::Duration, chrono::Duration) {
        (
            chrono::Duration::minutes(self.lookback_minutes),
            chrono::Duration::hours(self.lookahead_hours),
        )
    }
}

/// Desktop notification settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    /// Application name shown by the notification server.
    pub app_name: String,
    /// Seconds before a notification expires; 0 keeps it until dismissed.
    pub timeout_secs: u32,
    /// Custom notification icon path.
    pub icon_path: Option<String>,
    /// Freedesktop sound name.
    pub sound_name: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        let defaults = NotifyConfig::default();
        Self {
            app_name: defaults.app_name,
            timeout_secs: defaults.timeout_secs,
            icon_path: defaults.icon_path,
            sound_name: defaults.sound_name,
        }
    }
}

impl NotificationSettings {
    /// Builds the desktop sink configuration.
    pub fn to_notify_config(&self) -> NotifyConfig {
        let config = NotifyConfig::default()
            .with_app_name(&self.app_name)
            .with_timeout(self.timeout_secs)
            .with_sound_name(&self.sound_name);
        match self.icon_path {
            Some(ref icon) => config.with_icon_path(icon),
            None => config,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path. A missing file yields
    /// defaults.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
    }

    /// Parses TOML configuration.
    pub fn parse(content: &str) -> ClientResult<Self> {
        toml::from_str(content)
            .map_err(|e| ClientError::config(format!("failed to parse config: {}", e)))
    }

    /// Loads `path` if given, the default location otherwise.
    pub fn resolve(path: Option<&Path>) -> ClientResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    /// Checks the configuration. Returns warnings for settings that are
    /// legal but weaken alert delivery.
    pub fn validate(&self) -> ClientResult<Vec<String>> {
        let polling = &self.polling;
        if polling.interval_secs == 0 {
            return Err(ClientError::config("polling.interval_secs must be positive"));
        }
        if polling.lookahead_hours <= 0 {
            return Err(ClientError::config("polling.lookahead_hours must be positive"));
        }
        if polling.lookback_minutes < 0 {
            return Err(ClientError::config("polling.lookback_minutes must not be negative"));
        }

        let mut warnings = Vec::new();
        // Repairs only happen on polls; a slower cadence can outlast the grace period.
        if polling.interval_secs as i64 >= GRACE_PERIOD_SECS {
            warnings.push(format!(
                "polling.interval_secs = {} is not shorter than the {}s grace period; \
                 alerts lost to sleep may not be recovered",
                polling.interval_secs, GRACE_PERIOD_SECS
            ));
        }
        if !self.alerts.alerts_enabled {
            warnings.push("alerts.alerts_enabled is false; no alert will be shown".to_string());
        }
        Ok(warnings)
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loudalerts")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_is_default() {
        assert_eq!(ClientConfig::parse("").unwrap(), ClientConfig::default());
    }

    #[test]
    fn partial_sections() {
        let config = ClientConfig::parse(
            r#"
debug = true

[alerts]
default_reminder_minutes = 5
disabled_calendars = ["holidays"]

[polling]
interval_secs = 120
"#,
        )
        .unwrap();

        assert!(config.debug);
        assert_eq!(config.alerts.default_reminder_minutes, Some(5));
        assert!(config.alerts.skip_all_day_events);
        assert!(!config.alerts.is_calendar_enabled("holidays"));
        assert_eq!(config.polling.interval_secs, 120);
        assert_eq!(config.polling.lookahead_hours, 24);
        assert_eq!(config.notifications.app_name, "loudalerts");
    }

    #[test]
    fn parse_error_is_config_error() {
        let err = ClientConfig::parse("[polling]\ninterval_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[notifications]\ntimeout_secs = 20\nicon_path = \"/tmp/bell.png\"").unwrap();

        let config = ClientConfig::load_from(file.path()).unwrap();
        let notify = config.notifications.to_notify_config();
        assert_eq!(notify.timeout_secs, 20);
        assert_eq!(notify.icon_path.as_deref(), Some("/tmp/bell.png"));
    }

    #[test]
    fn load_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = ClientConfig::load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    fn dump_round_trips() {
        let config = ClientConfig {
            alerts: AlertSettings::default().with_default_reminder(Some(10)),
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(ClientConfig::parse(&text).unwrap(), config);
    }

    #[test]
    fn validation() {
        assert!(ClientConfig::default().validate().unwrap().is_empty());

        let mut slow = ClientConfig::default();
        slow.polling.interval_secs = 900;
        assert_eq!(slow.validate().unwrap().len(), 1);

        let mut broken = ClientConfig::default();
        broken.polling.interval_secs = 0;
        assert!(broken.validate().is_err());
    }

    #[test]
    fn default_path_is_under_loudalerts() {
        assert!(ClientConfig::default_path().ends_with("loudalerts/config.toml"));
    }
}
