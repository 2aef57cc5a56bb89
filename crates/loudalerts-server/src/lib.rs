//! Daemon side: alert engine, timers, polling, delivery.
//!
//! The [`AlertEngine`] decides when each calendar event alerts. It is driven
//! by an [`AlertService`] task, fed snapshots by a [`Poller`], and delivers
//! to an [`AlertSink`] such as [`DesktopSink`].
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loudalerts_server::{AlertEvent, AlertService, ChannelSink, SettingsHandle};
//! use loudalerts_core::EventSnapshot;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = SettingsHandle::default();
//!     let (sink, mut alerts) = ChannelSink::new();
//!     let service = AlertService::new(Arc::new(sink), settings.subscribe());
//!     let engine = service.handle();
//!     tokio::spawn(service.run());
//!
//!     let now = chrono::Utc::now();
//!     engine.reconcile(vec![EventSnapshot::test_event(now)]).await?;
//!     if let Some(AlertEvent::Fired(event)) = alerts.recv().await {
//!         println!("{}", event.title);
//!     }
//!     Ok(())
//! }
//! ```

mod config;
mod engine;
mod error;
mod notify;
mod poller;
mod service;
mod signals;
mod sink;
mod timers;

pub use config::{AlertSettings, SettingsHandle};
pub use engine::{
    ALERTED_RETENTION_SECS, AlertEngine, Decision, EngineStatus, FixedReminder, GRACE_PERIOD_SECS,
    ReconcileSummary, ReminderSource,
};
pub use error::{EngineError, EngineResult, ServerError, ServerResult, SourceError};
pub use notify::{DesktopSink, NotifyConfig, alert_body, alert_summary, should_present, snooze_actions};
pub use poller::{
    BoxFuture, EventSource, Poller, PollerCommand, PollerConfig, PollerHandle, PollerState,
    SharedPollerState, detect_clock_jump, new_poller_state,
};
pub use service::{AlertHandle, AlertService, EngineCommand};
pub use signals::{ReloadSignal, ShutdownHandle, SignalHandler};
pub use sink::{AlertEvent, AlertSink, ChannelSink, MultiSink, SnoozeRequest};
pub use timers::{TimerBackend, TimerKey, TimerKind, TokioTimers};
