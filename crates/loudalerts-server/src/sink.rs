//! Delivery sinks: where fired alerts go.
//!
//! A sink receives the full [`EventSnapshot`] of every fired alert and may
//! later send back a [`SnoozeRequest`]. Dismissing is purely presentational
//! and never re-enters the engine.

use tokio::sync::mpsc;
use tracing::debug;

use loudalerts_core::{EventSnapshot, SnoozeDelay};

/// Receives fired alerts from the engine.
///
/// Called from inside the engine's serialization domain, so implementations
/// must not block.
pub trait AlertSink: Send + Sync {
    /// An alert became due for `event`.
    fn alert_fired(&self, event: &EventSnapshot);

    /// Any current presentation of `event_id` should be taken down.
    fn dismiss(&self, event_id: &str) {
        let _ = event_id;
    }
}

/// A user request to re-deliver an alert later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoozeRequest {
    /// Event to snooze.
    pub event_id: String,
    /// Chosen delay.
    pub delay: SnoozeDelay,
}

impl SnoozeRequest {
    /// Creates a snooze request.
    pub fn new(event_id: impl Into<String>, delay: SnoozeDelay) -> Self {
        Self {
            event_id: event_id.into(),
            delay,
        }
    }
}

/// Something that happened at the sink boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
    /// An alert fired.
    Fired(EventSnapshot),
    /// The presentation for this event id was dismissed.
    Dismissed(String),
}

/// Sink that forwards every alert over a channel.
///
/// Useful for frontends living in another task, and for tests.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AlertEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<AlertEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelSink {
    fn alert_fired(&self, event: &EventSnapshot) {
        if self.tx.send(AlertEvent::Fired(event.clone())).is_err() {
            debug!(event_id = %event.id, "Alert receiver dropped");
        }
    }

    fn dismiss(&self, event_id: &str) {
        let _ = self.tx.send(AlertEvent::Dismissed(event_id.to_string()));
    }
}

/// Fans one alert out to several sinks.
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl MultiSink {
    /// Creates an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a sink.
    pub fn with(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl AlertSink for MultiSink {
    fn alert_fired(&self, event: &EventSnapshot) {
        for sink in &self.sinks {
            sink.alert_fired(event);
        }
    }

    fn dismiss(&self, event_id: &str) {
        for sink in &self.sinks {
            sink.dismiss(event_id);
        }
    }
}
