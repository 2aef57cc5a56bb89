//! Alert scheduling engine.
//!
//! Given a continuously refreshed snapshot of upcoming events, the engine
//! decides exactly once per event whether and when to fire an alert. It never
//! trusts a timer's liveness: every reconciliation re-derives the desired
//! deadline from absolute timestamps, so a timer lost to system sleep is
//! repaired on the next poll instead of being silently dropped.
//!
//! The engine is a plain single-writer struct. [`crate::service`] wraps it in
//! a tokio task so that every operation runs in one serialization domain.
//!
//! Per-event lifecycle:
//!
//! ```text
//! Unseen -> Scheduled -> Firing -> Alerted
//!              |  ^
//!              +--+  stale timer repaired
//! Alerted -> (snooze) -> re-delivered
//! Missed: grace period exceeded, nothing retained
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, trace, warn};

use loudalerts_core::{EventSnapshot, SnoozeDelay};

use crate::error::{EngineError, EngineResult};
use crate::sink::AlertSink;
use crate::timers::{TimerBackend, TimerKey, TimerKind};

/// Maximum lateness, in seconds, for which a due alert still fires.
///
/// One poll interval plus a minute of slack.
pub const GRACE_PERIOD_SECS: i64 = 360;

/// How long, in seconds past its start, an alerted event is remembered.
pub const ALERTED_RETENTION_SECS: i64 = 7200;

/// Supplies the default reminder for events without alarms.
///
/// Queried every time a scheduling decision is made; never cached.
pub trait ReminderSource: Send {
    /// Minutes before start, or `None` to leave alarmless events silent.
    fn default_reminder_minutes(&self) -> Option<u32>;
}

/// A reminder source that never changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FixedReminder(pub Option<u32>);

impl ReminderSource for FixedReminder {
    fn default_reminder_minutes(&self) -> Option<u32> {
        self.0
    }
}

/// Outcome of one per-event scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Already fired; nothing to do.
    AlreadyAlerted,
    /// A valid timer is already armed.
    Pending,
    /// A new timer was armed.
    Armed,
    /// The alert fired immediately.
    Fired,
    /// Every fire time fell outside the grace period.
    Missed,
    /// No alarms and no default reminder.
    Suppressed,
}

/// Counters describing one reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Timers cancelled because their event left the snapshot.
    pub removed: usize,
    /// Alerted entries forgotten after the retention window.
    pub pruned: usize,
    /// Stale alert timers re-derived.
    pub repaired: usize,
    /// Overdue snoozes delivered.
    pub snoozes_repaired: usize,
    /// New timers armed.
    pub armed: usize,
    /// Alerts fired immediately.
    pub fired: usize,
    /// Alerts missed.
    pub missed: usize,
    /// Events left silent.
    pub suppressed: usize,
    /// Events whose timer was left untouched.
    pub pending: usize,
}

impl ReconcileSummary {
    fn record(&mut self, decision: Decision) {
        match decision {
            Decision::AlreadyAlerted => {}
            Decision::Pending => self.pending += 1,
            Decision::Armed => self.armed += 1,
            Decision::Fired => self.fired += 1,
            Decision::Missed => self.missed += 1,
            Decision::Suppressed => self.suppressed += 1,
        }
    }
}

/// Read-only snapshot of the engine's bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    /// Armed alert timers.
    pub active_timers: usize,
    /// Events remembered as alerted.
    pub alerted: usize,
    /// Pending snoozes.
    pub snoozed: usize,
    /// Stale alert timers repaired since start.
    pub stale_repairs: u64,
    /// Earliest armed deadline, alert or snooze.
    pub next_deadline: Option<DateTime<Utc>>,
}

/// An armed deadline for one event.
#[derive(Debug, Clone)]
struct ArmedTimer {
    key: TimerKey,
    deadline: DateTime<Utc>,
    event: EventSnapshot,
}

/// Remembers a fired event. `start` is the event start at fire time.
#[derive(Debug, Clone)]
struct AlertedEntry {
    start: DateTime<Utc>,
    event: EventSnapshot,
}

/// The alert scheduling engine.
pub struct AlertEngine {
    timers: Box<dyn TimerBackend>,
    sink: Arc<dyn AlertSink>,
    reminders: Box<dyn ReminderSource>,
    active: HashMap<String, ArmedTimer>,
    alerted: HashMap<String, AlertedEntry>,
    snoozed: HashMap<String, ArmedTimer>,
    next_generation: u64,
    stale_repairs: u64,
}

impl AlertEngine {
    /// Creates an engine.
    pub fn new(
        timers: impl TimerBackend + 'static,
        sink: Arc<dyn AlertSink>,
        reminders: impl ReminderSource + 'static,
    ) -> Self {
        Self {
            timers: Box::new(timers),
            sink,
            reminders: Box::new(reminders),
            active: HashMap::new(),
            alerted: HashMap::new(),
            snoozed: HashMap::new(),
            next_generation: 0,
            stale_repairs: 0,
        }
    }

    /// Reconciles the engine against a fresh snapshot of events.
    ///
    /// Timers of vanished events are cancelled before anything is armed, so
    /// an id is never scheduled twice.
    pub fn reconcile(&mut self, events: &[EventSnapshot], now: DateTime<Utc>) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();

        let current: HashSet<&str> = events.iter().map(|e| e.id.as_str()).collect();
        let vanished: Vec<String> = self
            .active
            .keys()
            .filter(|id| !current.contains(id.as_str()))
            .cloned()
            .collect();
        for id in vanished {
            if let Some(armed) = self.active.remove(&id) {
                debug!(event_id = %id, "Event left the snapshot, cancelling timer");
                self.timers.cancel(&armed.key);
                summary.removed += 1;
            }
        }

        let cutoff = now - Duration::seconds(ALERTED_RETENTION_SECS);
        let before = self.alerted.len();
        self.alerted.retain(|_, entry| entry.start >= cutoff);
        summary.pruned = before - self.alerted.len();

        summary.snoozes_repaired = self.repair_stale_snoozes(now);

        let repairs_before = self.stale_repairs;
        for event in events {
            let decision = self.schedule(event, now);
            summary.record(decision);
        }
        summary.repaired = (self.stale_repairs - repairs_before) as usize;

        debug!(
            events = events.len(),
            removed = summary.removed,
            pruned = summary.pruned,
            repaired = summary.repaired,
            armed = summary.armed,
            fired = summary.fired,
            missed = summary.missed,
            "Reconciled events"
        );
        summary
    }

    /// Handles the expiry of an armed timer.
    ///
    /// Keys that no longer match a record (cancelled, superseded) are
    /// ignored and yield `None`.
    pub fn on_timer_fired(&mut self, key: &TimerKey, now: DateTime<Utc>) -> Option<Decision> {
        let records = match key.kind {
            TimerKind::Alert => &mut self.active,
            TimerKind::Snooze => &mut self.snoozed,
        };
        if !records
            .get(&key.event_id)
            .is_some_and(|armed| armed.key == *key)
        {
            trace!(key = %key, "Ignoring expiry of superseded timer");
            return None;
        }
        let armed = records.remove(&key.event_id)?;
        self.timers.cancel(&armed.key);

        match key.kind {
            // Re-run the decision: fires when due, re-arms if the wall clock
            // moved backwards, misses if the expiry ran too late.
            TimerKind::Alert => Some(self.schedule(&armed.event, now)),
            TimerKind::Snooze => Some(self.deliver_snooze(armed.event, armed.deadline, now)),
        }
    }

    /// Drops every armed alert timer after a wake from sleep.
    ///
    /// Alerted state is kept and pending snoozes are re-armed from their
    /// absolute deadlines. The caller must reconcile right afterwards.
    pub fn invalidate_all_timers(&mut self) -> usize {
        let count = self.active.len();
        for (_, armed) in self.active.drain() {
            self.timers.cancel(&armed.key);
        }

        let snoozes: Vec<ArmedTimer> = self.snoozed.drain().map(|(_, armed)| armed).collect();
        for armed in snoozes {
            self.timers.cancel(&armed.key);
            let key = self.arm_timer(&armed.event.id, TimerKind::Snooze, armed.deadline);
            self.snoozed
                .insert(armed.event.id.clone(), ArmedTimer { key, ..armed });
        }

        info!(count, snoozes = self.snoozed.len(), "Invalidated alert timers");
        count
    }

    /// Cancels everything and forgets which events were alerted.
    pub fn cancel_all(&mut self) {
        for (_, armed) in self.active.drain().chain(self.snoozed.drain()) {
            self.timers.cancel(&armed.key);
        }
        self.alerted.clear();
        info!("Cancelled all alerts");
    }

    /// Snoozes a presented alert.
    ///
    /// Returns the absolute time of the re-delivery. A snooze bypasses the
    /// at-most-once guard; it is an explicit request to see the alert again.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UnknownEvent`] if the engine holds no record of
    /// `event_id`.
    pub fn snooze(
        &mut self,
        event_id: &str,
        delay: SnoozeDelay,
        now: DateTime<Utc>,
    ) -> EngineResult<DateTime<Utc>> {
        let event = self
            .alerted
            .get(event_id)
            .map(|entry| entry.event.clone())
            .or_else(|| self.snoozed.get(event_id).map(|s| s.event.clone()))
            .or_else(|| self.active.get(event_id).map(|a| a.event.clone()))
            .ok_or_else(|| EngineError::unknown_event(event_id))?;

        self.sink.dismiss(event_id);

        // Snoozing an alert that has not fired yet replaces it.
        if let Some(armed) = self.active.remove(event_id) {
            self.timers.cancel(&armed.key);
        }
        self.alerted
            .entry(event.id.clone())
            .or_insert_with(|| AlertedEntry {
                start: event.start,
                event: event.clone(),
            });
        if let Some(previous) = self.snoozed.remove(event_id) {
            self.timers.cancel(&previous.key);
        }

        let deadline = delay.fire_at(event.start, now);
        info!(
            event_id = %event.id,
            delay = %delay,
            until = %deadline,
            "Alert snoozed"
        );

        if deadline <= now {
            self.deliver_snooze(event, deadline, now);
        } else {
            let key = self.arm_timer(&event.id, TimerKind::Snooze, deadline);
            self.snoozed.insert(
                event.id.clone(),
                ArmedTimer {
                    key,
                    deadline,
                    event,
                },
            );
        }

        Ok(deadline)
    }

    /// Deadline of the armed alert timer for `event_id`, if any.
    pub fn armed_deadline(&self, event_id: &str) -> Option<DateTime<Utc>> {
        self.active.get(event_id).map(|armed| armed.deadline)
    }

    /// Deadline of the pending snooze for `event_id`, if any.
    pub fn snoozed_until(&self, event_id: &str) -> Option<DateTime<Utc>> {
        self.snoozed.get(event_id).map(|armed| armed.deadline)
    }

    /// Returns true if `event_id` has fired and is still remembered.
    pub fn is_alerted(&self, event_id: &str) -> bool {
        self.alerted.contains_key(event_id)
    }

    /// Number of armed alert timers.
    pub fn active_timer_count(&self) -> usize {
        self.active.len()
    }

    /// Returns a copy of the engine's bookkeeping counters.
    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            active_timers: self.active.len(),
            alerted: self.alerted.len(),
            snoozed: self.snoozed.len(),
            stale_repairs: self.stale_repairs,
            next_deadline: self
                .active
                .values()
                .chain(self.snoozed.values())
                .map(|armed| armed.deadline)
                .min(),
        }
    }

    fn schedule(&mut self, event: &EventSnapshot, now: DateTime<Utc>) -> Decision {
        if self.alerted.contains_key(&event.id) {
            return Decision::AlreadyAlerted;
        }

        let stale_deadline = match self.active.get_mut(&event.id) {
            Some(armed) if armed.deadline > now => {
                armed.event = event.clone();
                return Decision::Pending;
            }
            Some(armed) => Some(armed.deadline),
            None => None,
        };
        if let Some(deadline) = stale_deadline {
            warn!(
                event_id = %event.id,
                deadline = %deadline,
                lateness_secs = (now - deadline).num_seconds(),
                "Timer deadline passed without firing, rescheduling"
            );
            self.stale_repairs += 1;
            if let Some(stale) = self.active.remove(&event.id) {
                self.timers.cancel(&stale.key);
            }
        }

        let earliest_allowed = now - Duration::seconds(GRACE_PERIOD_SECS);
        if event.start < earliest_allowed {
            debug!(event_id = %event.id, start = %event.start, "Event started too long ago");
            return Decision::Missed;
        }

        let fire_times = event.fire_times(self.reminders.default_reminder_minutes());
        if fire_times.is_empty() {
            trace!(event_id = %event.id, "No alarms and no default reminder");
            return Decision::Suppressed;
        }

        let Some(deadline) = fire_times
            .into_iter()
            .filter(|at| *at >= earliest_allowed)
            .min()
        else {
            info!(
                event_id = %event.id,
                title = %event.title,
                start = %event.start,
                "All alarm times are past the grace period, alert missed"
            );
            return Decision::Missed;
        };

        if deadline <= now {
            self.fire(event.clone(), now);
            return Decision::Fired;
        }

        let key = self.arm_timer(&event.id, TimerKind::Alert, deadline);
        debug!(event_id = %event.id, deadline = %deadline, "Alert scheduled");
        self.active.insert(
            event.id.clone(),
            ArmedTimer {
                key,
                deadline,
                event: event.clone(),
            },
        );
        Decision::Armed
    }

    fn fire(&mut self, event: EventSnapshot, now: DateTime<Utc>) {
        if let Some(armed) = self.active.remove(&event.id) {
            self.timers.cancel(&armed.key);
        }
        info!(
            event_id = %event.id,
            title = %event.title,
            starts_in_secs = (event.start - now).num_seconds(),
            "Alert fired"
        );
        self.alerted.insert(
            event.id.clone(),
            AlertedEntry {
                start: event.start,
                event: event.clone(),
            },
        );
        self.sink.alert_fired(&event);
    }

    fn deliver_snooze(
        &mut self,
        event: EventSnapshot,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Decision {
        let lateness = now - deadline;
        if lateness > Duration::seconds(GRACE_PERIOD_SECS) {
            info!(
                event_id = %event.id,
                lateness_secs = lateness.num_seconds(),
                "Snoozed alert is past the grace period, dropping"
            );
            return Decision::Missed;
        }

        info!(event_id = %event.id, title = %event.title, "Snoozed alert fired");
        self.sink.alert_fired(&event);
        self.alerted.insert(
            event.id.clone(),
            AlertedEntry {
                start: event.start,
                event,
            },
        );
        Decision::Fired
    }

    fn repair_stale_snoozes(&mut self, now: DateTime<Utc>) -> usize {
        let overdue: Vec<String> = self
            .snoozed
            .iter()
            .filter(|(_, armed)| armed.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &overdue {
            if let Some(armed) = self.snoozed.remove(id) {
                warn!(event_id = %id, deadline = %armed.deadline, "Snooze timer never fired, delivering now");
                self.timers.cancel(&armed.key);
                self.deliver_snooze(armed.event, armed.deadline, now);
            }
        }
        overdue.len()
    }

    fn arm_timer(&mut self, event_id: &str, kind: TimerKind, deadline: DateTime<Utc>) -> TimerKey {
        self.next_generation += 1;
        let key = TimerKey::new(event_id, kind, self.next_generation);
        self.timers.arm(key.clone(), deadline);
        key
    }
}
