//! One-shot timers keyed by event id.
//!
//! The engine never hands a closure to a timer. It arms a [`TimerKey`] for an
//! absolute deadline and the backend delivers that key back when the deadline
//! passes. Keys carry a generation so that an expiry which raced with a
//! cancellation is recognised as stale and dropped by the engine.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// What an armed timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// The regular alarm derived from the event's offsets.
    Alert,
    /// A user-requested re-delivery.
    Snooze,
}

/// Identifies one armed timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Event the timer belongs to.
    pub event_id: String,
    /// Alert or snooze.
    pub kind: TimerKind,
    /// Monotonic counter assigned by the engine when arming.
    pub generation: u64,
}

impl TimerKey {
    /// Creates a key.
    pub fn new(event_id: impl Into<String>, kind: TimerKind, generation: u64) -> Self {
        Self {
            event_id: event_id.into(),
            kind,
            generation,
        }
    }
}

impl fmt::Display for TimerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TimerKind::Alert => "alert",
            TimerKind::Snooze => "snooze",
        };
        write!(f, "{}:{}#{}", kind, self.event_id, self.generation)
    }
}

/// A source of one-shot timers.
///
/// `cancel` must take effect before it returns: once cancelled, the backend
/// may still have delivered the key earlier, but it will not deliver it later.
pub trait TimerBackend: Send {
    /// Arms a timer delivering `key` at `deadline`.
    fn arm(&mut self, key: TimerKey, deadline: DateTime<Utc>);

    /// Cancels the timer for `key`. Cancelling an unknown or already fired key
    /// is a no-op.
    fn cancel(&mut self, key: &TimerKey);
}

/// Timer backend built on tokio tasks.
///
/// Each armed key is a task that sleeps until the deadline and then sends the
/// key on the expiry channel. The wall-clock deadline is converted to a sleep
/// duration at arm time; if the machine sleeps, the sleep may overrun, which
/// the engine repairs on its next reconciliation.
pub struct TokioTimers {
    expired_tx: mpsc::UnboundedSender<TimerKey>,
    tasks: HashMap<TimerKey, JoinHandle<()>>,
}

impl TokioTimers {
    /// Creates a backend and the receiver on which expired keys arrive.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerKey>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();
        (
            Self {
                expired_tx,
                tasks: HashMap::new(),
            },
            expired_rx,
        )
    }

    /// Number of timer tasks currently tracked.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns true if no timer task is tracked.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TimerBackend for TokioTimers {
    fn arm(&mut self, key: TimerKey, deadline: DateTime<Utc>) {
        let delay = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let tx = self.expired_tx.clone();
        let expired = key.clone();

        trace!(key = %key, delay_ms = delay.as_millis() as u64, "Arming timer");
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(expired);
        });

        if let Some(previous) = self.tasks.insert(key, task) {
            previous.abort();
        }
    }

    fn cancel(&mut self, key: &TimerKey) {
        if let Some(task) = self.tasks.remove(key) {
            trace!(key = %key, "Cancelling timer");
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_display() {
        let key = TimerKey::new("evt-1", TimerKind::Snooze, 7);
        assert_eq!(key.to_string(), "snooze:evt-1#7");
    }

    #[tokio::test]
    async fn armed_timer_delivers_key() {
        let (mut timers, mut rx) = TokioTimers::new();
        let key = TimerKey::new("evt-1", TimerKind::Alert, 1);
        timers.arm(key.clone(), Utc::now() + chrono::Duration::milliseconds(20));

        let got = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(key));
    }

    #[tokio::test]
    async fn past_deadline_delivers_immediately() {
        let (mut timers, mut rx) = TokioTimers::new();
        let key = TimerKey::new("evt-1", TimerKind::Alert, 1);
        timers.arm(key.clone(), Utc::now() - chrono::Duration::seconds(30));

        let got = tokio::time::timeout(Duration::from_millis(500), rx.recv())
            .await
            .unwrap();
        assert_eq!(got, Some(key));
    }

    #[tokio::test]
    async fn cancelled_timer_never_delivers() {
        let (mut timers, mut rx) = TokioTimers::new();
        let key = TimerKey::new("evt-1", TimerKind::Alert, 1);
        timers.arm(key.clone(), Utc::now() + chrono::Duration::milliseconds(30));
        timers.cancel(&key);
        assert!(timers.is_empty());

        let got = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await;
        assert!(got.is_err(), "cancelled timer fired: {:?}", got);
    }

    #[tokio::test]
    async fn cancel_unknown_key_is_noop() {
        let (mut timers, _rx) = TokioTimers::new();
        timers.cancel(&TimerKey::new("missing", TimerKind::Snooze, 3));
        assert_eq!(timers.len(), 0);
    }
}
