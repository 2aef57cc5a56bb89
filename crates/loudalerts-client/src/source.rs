//! JSON file event source.
//!
//! Reads a JSON array of events such as:
//!
//! ```json
//! [
//!   {
//!     "id": "standup-2025-03-14",
//!     "title": "Standup",
//!     "start": "2025-03-14T09:30:00Z",
//!     "end": "2025-03-14T09:45:00Z",
//!     "calendar_id": "work",
//!     "alarms": [-300, 0]
//!   }
//! ]
//! ```
//!
//! `alarms` are offsets in seconds relative to `start`. Absent or empty means
//! the event has no alarms of its own. The file is re-read on every fetch so
//! an external exporter can rewrite it at any time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::watch;
use tracing::debug;

use loudalerts_core::EventSnapshot;
use loudalerts_server::{AlertSettings, BoxFuture, EventSource, SourceError};

#[derive(Debug, Deserialize)]
struct FileEvent {
    id: String,
    title: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    #[serde(default)]
    all_day: bool,
    #[serde(default)]
    calendar_id: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    alarms: Vec<i64>,
}

impl From<FileEvent> for EventSnapshot {
    fn from(e: FileEvent) -> Self {
        let snapshot = EventSnapshot::new(e.id, e.title, e.start, e.end)
            .with_all_day(e.all_day)
            .with_calendar_id(e.calendar_id)
            .with_alarm_offsets(e.alarms);
        match e.location {
            Some(location) => snapshot.with_location(location),
            None => snapshot,
        }
    }
}

/// Parses the JSON event list.
pub fn parse_events(content: &str, origin: &str) -> Result<Vec<EventSnapshot>, SourceError> {
    let events: Vec<FileEvent> =
        serde_json::from_str(content).map_err(|e| SourceError::parse(origin, e.to_string()))?;
    Ok(events.into_iter().map(EventSnapshot::from).collect())
}

/// Keeps events starting in `[now - lookback, now + lookahead)` from enabled
/// calendars, sorted by start.
pub fn select_events(
    events: Vec<EventSnapshot>,
    settings: &AlertSettings,
    now: DateTime<Utc>,
    lookback: Duration,
    lookahead: Duration,
) -> Vec<EventSnapshot> {
    let from = now - lookback;
    let until = now + lookahead;
    let mut selected: Vec<EventSnapshot> = events
        .into_iter()
        .filter(|e| e.start >= from && e.start < until)
        .filter(|e| settings.is_calendar_enabled(&e.calendar_id))
        .collect();
    selected.sort_by_key(|e| e.start);
    selected
}

/// Event source backed by a JSON file.
pub struct FileEventSource {
    path: PathBuf,
    origin: String,
    settings: watch::Receiver<AlertSettings>,
    lookback: Duration,
    lookahead: Duration,
}

impl FileEventSource {
    /// Creates a source reading `path`, filtered by the live `settings`.
    pub fn new(path: impl AsRef<Path>, settings: watch::Receiver<AlertSettings>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            origin: path.display().to_string(),
            path,
            settings,
            lookback: Duration::hours(1),
            lookahead: Duration::hours(24),
        }
    }

    /// Builder: set the fetch window.
    pub fn with_window(mut self, lookback: Duration, lookahead: Duration) -> Self {
        self.lookback = lookback;
        self.lookahead = lookahead;
        self
    }

    async fn load(&self, now: DateTime<Utc>) -> Result<Vec<EventSnapshot>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::read(&self.origin, e))?;
        let events = parse_events(&content, &self.origin)?;
        let total = events.len();

        let settings = self.settings.borrow().clone();
        let selected = select_events(events, &settings, now, self.lookback, self.lookahead);
        debug!(
            path = %self.origin,
            total,
            selected = selected.len(),
            "Loaded events"
        );
        Ok(selected)
    }
}

impl EventSource for FileEventSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch_events(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<EventSnapshot>, SourceError>> {
        Box::pin(self.load(now))
    }
}
