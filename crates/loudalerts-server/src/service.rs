//! Runs the alert engine in its own task.
//!
//! Every operation, timer expiry and snooze request is funnelled through one
//! `select!` loop, so the engine's maps are only ever touched by one task.
//! Callers talk to it through a cloneable [`AlertHandle`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use loudalerts_core::{EventSnapshot, SnoozeDelay};

use crate::engine::{AlertEngine, EngineStatus, ReconcileSummary, ReminderSource};
use crate::error::{EngineError, EngineResult};
use crate::sink::{AlertSink, SnoozeRequest};
use crate::timers::{TimerKey, TokioTimers};

/// Commands accepted by a running [`AlertService`].
#[derive(Debug)]
pub enum EngineCommand {
    /// Reconcile against a fresh snapshot.
    Reconcile {
        events: Vec<EventSnapshot>,
        reply: oneshot::Sender<ReconcileSummary>,
    },
    /// Drop armed timers after a wake.
    InvalidateAllTimers { reply: oneshot::Sender<usize> },
    /// Cancel everything and forget alerted events.
    CancelAll { reply: oneshot::Sender<()> },
    /// Snooze a presented alert.
    Snooze {
        event_id: String,
        delay: SnoozeDelay,
        reply: oneshot::Sender<EngineResult<DateTime<Utc>>>,
    },
    /// Report bookkeeping counters.
    Status { reply: oneshot::Sender<EngineStatus> },
    /// Stop the service.
    Stop,
}

/// Owns an [`AlertEngine`] backed by tokio timers.
pub struct AlertService {
    engine: AlertEngine,
    expired_rx: mpsc::UnboundedReceiver<TimerKey>,
    command_tx: mpsc::Sender<EngineCommand>,
    command_rx: mpsc::Receiver<EngineCommand>,
    snooze_rx: Option<mpsc::UnboundedReceiver<SnoozeRequest>>,
}

impl AlertService {
    /// Creates a service delivering alerts to `sink`.
    pub fn new(sink: Arc<dyn AlertSink>, reminders: impl ReminderSource + 'static) -> Self {
        let (timers, expired_rx) = TokioTimers::new();
        let (command_tx, command_rx) = mpsc::channel(32);
        Self {
            engine: AlertEngine::new(timers, sink, reminders),
            expired_rx,
            command_tx,
            command_rx,
            snooze_rx: None,
        }
    }

    /// Builder: also accept snooze requests coming back from a sink.
    pub fn with_snooze_requests(mut self, rx: mpsc::UnboundedReceiver<SnoozeRequest>) -> Self {
        self.snooze_rx = Some(rx);
        self
    }

    /// Returns a handle for sending commands to the service.
    pub fn handle(&self) -> AlertHandle {
        AlertHandle {
            command_tx: self.command_tx.clone(),
        }
    }

    /// Runs until [`AlertHandle::stop`] is called. Pending timers are
    /// cancelled on the way out.
    pub async fn run(mut self) {
        info!("Alert service started");

        let (_keep_open, idle_rx) = mpsc::unbounded_channel();
        let mut snooze_rx = self.snooze_rx.take().unwrap_or(idle_rx);

        loop {
            tokio::select! {
                Some(key) = self.expired_rx.recv() => {
                    debug!(key = %key, "Timer expired");
                    self.engine.on_timer_fired(&key, Utc::now());
                }
                Some(request) = snooze_rx.recv() => {
                    if let Err(e) = self.engine.snooze(&request.event_id, request.delay, Utc::now()) {
                        warn!(event_id = %request.event_id, error = %e, "Snooze request rejected");
                    }
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(EngineCommand::Stop) | None => {
                            info!("Alert service stopping");
                            break;
                        }
                        Some(cmd) => self.dispatch(cmd),
                    }
                }
            }
        }

        self.engine.cancel_all();
    }

    fn dispatch(&mut self, cmd: EngineCommand) {
        let now = Utc::now();
        // A dropped reply only means the caller stopped waiting.
        match cmd {
            EngineCommand::Reconcile { events, reply } => {
                let _ = reply.send(self.engine.reconcile(&events, now));
            }
            EngineCommand::InvalidateAllTimers { reply } => {
                let _ = reply.send(self.engine.invalidate_all_timers());
            }
            EngineCommand::CancelAll { reply } => {
                self.engine.cancel_all();
                let _ = reply.send(());
            }
            EngineCommand::Snooze {
                event_id,
                delay,
                reply,
            } => {
                let _ = reply.send(self.engine.snooze(&event_id, delay, now));
            }
            EngineCommand::Status { reply } => {
                let _ = reply.send(self.engine.status());
            }
            EngineCommand::Stop => {}
        }
    }
}

/// Handle for talking to a running [`AlertService`].
#[derive(Debug, Clone)]
pub struct AlertHandle {
    command_tx: mpsc::Sender<EngineCommand>,
}

impl AlertHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> EngineResult<T> {
        let (reply, rx) = oneshot::channel();
        self.command_tx
            .send(make(reply))
            .await
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    /// Reconciles against a fresh snapshot of events.
    pub async fn reconcile(&self, events: Vec<EventSnapshot>) -> EngineResult<ReconcileSummary> {
        self.request(|reply| EngineCommand::Reconcile { events, reply })
            .await
    }

    /// Drops every armed alert timer. Follow with [`Self::reconcile`].
    pub async fn invalidate_all_timers(&self) -> EngineResult<usize> {
        self.request(|reply| EngineCommand::InvalidateAllTimers { reply })
            .await
    }

    /// Cancels every timer and forgets alerted events.
    pub async fn cancel_all(&self) -> EngineResult<()> {
        self.request(|reply| EngineCommand::CancelAll { reply })
            .await
    }

    /// Snoozes a presented alert; returns when it will be shown again.
    pub async fn snooze(
        &self,
        event_id: impl Into<String>,
        delay: SnoozeDelay,
    ) -> EngineResult<DateTime<Utc>> {
        let event_id = event_id.into();
        self.request(|reply| EngineCommand::Snooze {
            event_id,
            delay,
            reply,
        })
        .await?
    }

    /// Returns the engine's bookkeeping counters.
    pub async fn status(&self) -> EngineResult<EngineStatus> {
        self.request(|reply| EngineCommand::Status { reply }).await
    }

    /// Stops the service.
    pub async fn stop(&self) -> EngineResult<()> {
        self.command_tx
            .send(EngineCommand::Stop)
            .await
            .map_err(|_| EngineError::Stopped)
    }
}
