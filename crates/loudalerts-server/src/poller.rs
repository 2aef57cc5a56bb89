//! Periodic event polling and wake detection.
//!
//! The poller fetches a fresh snapshot from an [`EventSource`] every poll
//! interval and hands it to the engine. It also watches for the machine
//! waking from sleep by comparing elapsed wall-clock time with elapsed
//! monotonic time: a suspended machine advances the former but not the
//! latter. On wake every armed timer is invalidated and a sync runs at once.
//!
//! Fetch failures back off exponentially. The last good snapshot is
//! reconciled again meanwhile, so stale timers keep being repaired even while
//! the source is down.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use loudalerts_core::EventSnapshot;

use crate::error::SourceError;
use crate::service::AlertHandle;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Supplies snapshots of upcoming events.
pub trait EventSource: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Fetches the events relevant at `now`, sorted by start.
    fn fetch_events(
        &self,
        now: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<Vec<EventSnapshot>, SourceError>>;
}

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval between regular syncs.
    pub poll_interval: Duration,
    /// Initial backoff duration on error.
    pub initial_backoff: Duration,
    /// Maximum backoff duration.
    pub max_backoff: Duration,
    /// Backoff multiplier.
    pub backoff_multiplier: f64,
    /// How often to compare wall and monotonic clocks.
    pub wake_check_interval: Duration,
    /// Divergence between the clocks treated as a wake from sleep.
    pub wake_threshold: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300),
            initial_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 2.0,
            wake_check_interval: Duration::from_secs(15),
            wake_threshold: Duration::from_secs(30),
        }
    }
}

impl PollerConfig {
    /// Creates a config with the given poll interval.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            ..Default::default()
        }
    }

    /// Builder: set backoff parameters.
    pub fn with_backoff(mut self, initial: Duration, max: Duration, multiplier: f64) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self.backoff_multiplier = multiplier;
        self
    }

    /// Builder: set wake detection parameters.
    pub fn with_wake_detection(mut self, check_interval: Duration, threshold: Duration) -> Self {
        self.wake_check_interval = check_interval;
        self.wake_threshold = threshold;
        self
    }

    /// Calculates backoff delay based on consecutive failures.
    ///
    /// Never longer than the poll interval.
    pub fn backoff_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_backoff.as_secs_f64();
        let multiplier = self
            .backoff_multiplier
            .powi(i32::try_from(consecutive_failures.saturating_sub(1)).unwrap_or(i32::MAX));
        let max = self.max_backoff.min(self.poll_interval).as_secs_f64();

        Duration::from_secs_f64((base * multiplier).min(max))
    }

    fn next_delay(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures > 0 {
            self.backoff_delay(consecutive_failures)
        } else {
            self.poll_interval
        }
    }
}

/// Returns how far the wall clock moved relative to the monotonic clock, if
/// that exceeds `threshold` in either direction.
pub fn detect_clock_jump(
    wall_elapsed: chrono::Duration,
    monotonic_elapsed: Duration,
    threshold: Duration,
) -> Option<chrono::Duration> {
    let monotonic = chrono::Duration::from_std(monotonic_elapsed).ok()?;
    let threshold = chrono::Duration::from_std(threshold).ok()?;
    let drift = wall_elapsed - monotonic;
    (drift.abs() > threshold).then_some(drift)
}

/// Commands that can be sent to the poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerCommand {
    /// Fetch and reconcile now.
    SyncNow,
    /// Treat as a wake from sleep: invalidate timers, then sync.
    Wake,
    /// Stop the poller.
    Stop,
}

/// Poller state.
#[derive(Debug, Clone, Default)]
pub struct PollerState {
    /// Number of consecutive fetch failures.
    pub consecutive_failures: u32,
    /// Last successful sync time.
    pub last_sync: Option<DateTime<Utc>>,
    /// Last sync attempt time.
    pub last_attempt: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Events in the last good snapshot.
    pub last_event_count: usize,
    /// Wakes handled since start.
    pub wakes: u64,
}

impl PollerState {
    /// Records a successful sync.
    pub fn record_success(&mut self, event_count: usize) {
        self.consecutive_failures = 0;
        self.last_sync = Some(Utc::now());
        self.last_attempt = self.last_sync;
        self.last_error = None;
        self.last_event_count = event_count;
    }

    /// Records a failed sync.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.consecutive_failures += 1;
        self.last_attempt = Some(Utc::now());
        self.last_error = Some(error.into());
    }
}

/// Shared poller state.
pub type SharedPollerState = Arc<RwLock<PollerState>>;

/// Creates a new shared poller state.
pub fn new_poller_state() -> SharedPollerState {
    Arc::new(RwLock::new(PollerState::default()))
}

/// Feeds the engine with fresh snapshots.
pub struct Poller {
    config: PollerConfig,
    source: Arc<dyn EventSource>,
    engine: AlertHandle,
    state: SharedPollerState,
    last_events: Vec<EventSnapshot>,
    command_tx: mpsc::Sender<PollerCommand>,
    command_rx: mpsc::Receiver<PollerCommand>,
}

impl Poller {
    /// Creates a poller reading from `source` and reconciling into `engine`.
    pub fn new(config: PollerConfig, source: Arc<dyn EventSource>, engine: AlertHandle) -> Self {
        let (command_tx, command_rx) = mpsc::channel(16);
        Self {
            config,
            source,
            engine,
            state: new_poller_state(),
            last_events: Vec::new(),
            command_tx,
            command_rx,
        }
    }

    /// Returns a handle for sending commands to the poller.
    pub fn handle(&self) -> PollerHandle {
        PollerHandle {
            command_tx: self.command_tx.clone(),
            state: self.state.clone(),
        }
    }

    /// Returns the shared state.
    pub fn state(&self) -> SharedPollerState {
        self.state.clone()
    }

    /// Runs the poll loop until stopped.
    pub async fn run(mut self) {
        info!(
            source = self.source.name(),
            interval_secs = self.config.poll_interval.as_secs(),
            "Poller started"
        );

        self.sync().await;

        let mut wake_tick = tokio::time::interval(self.config.wake_check_interval);
        wake_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_wall = Utc::now();
        let mut last_mono = Instant::now();
        let mut next_sync = Instant::now() + self.next_delay().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(next_sync) => {
                    self.sync().await;
                    next_sync = Instant::now() + self.next_delay().await;
                }
                _ = wake_tick.tick() => {
                    let (wall, mono) = (Utc::now(), Instant::now());
                    if let Some(jump) = detect_clock_jump(
                        wall - last_wall,
                        mono - last_mono,
                        self.config.wake_threshold,
                    ) {
                        info!(jump_secs = jump.num_seconds(), "Clock jump detected, assuming wake from sleep");
                        self.wake().await;
                        next_sync = Instant::now() + self.next_delay().await;
                    }
                    last_wall = Utc::now();
                    last_mono = Instant::now();
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(PollerCommand::SyncNow) => {
                            debug!("Received SyncNow command");
                            self.sync().await;
                            next_sync = Instant::now() + self.next_delay().await;
                        }
                        Some(PollerCommand::Wake) => {
                            debug!("Received Wake command");
                            self.wake().await;
                            next_sync = Instant::now() + self.next_delay().await;
                        }
                        Some(PollerCommand::Stop) | None => {
                            info!("Poller stopping");
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn next_delay(&self) -> Duration {
        let failures = self.state.read().await.consecutive_failures;
        let delay = self.config.next_delay(failures);
        debug!(failures, delay_secs = delay.as_secs(), "Scheduling next sync");
        delay
    }

    async fn wake(&mut self) {
        self.state.write().await.wakes += 1;
        match self.engine.invalidate_all_timers().await {
            Ok(count) => debug!(count, "Timers invalidated after wake"),
            Err(e) => error!(error = %e, "Could not invalidate timers"),
        }
        self.sync().await;
    }

    async fn sync(&mut self) {
        debug!(source = self.source.name(), "Starting sync");
        match self.source.fetch_events(Utc::now()).await {
            Ok(events) => {
                self.state.write().await.record_success(events.len());
                self.last_events = events;
            }
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "Fetching events failed");
                self.state.write().await.record_failure(e.to_string());
            }
        }

        match self.engine.reconcile(self.last_events.clone()).await {
            Ok(summary) => debug!(
                events = self.last_events.len(),
                armed = summary.armed,
                fired = summary.fired,
                "Sync completed"
            ),
            Err(e) => error!(error = %e, "Alert engine unavailable"),
        }
    }
}

/// Handle for sending commands to a running poller.
#[derive(Clone, Debug)]
pub struct PollerHandle {
    command_tx: mpsc::Sender<PollerCommand>,
    state: SharedPollerState,
}

impl PollerHandle {
    /// Triggers an immediate sync.
    pub async fn sync_now(&self) -> Result<(), mpsc::error::SendError<PollerCommand>> {
        self.command_tx.send(PollerCommand::SyncNow).await
    }

    /// Reports a wake from sleep detected elsewhere.
    pub async fn wake(&self) -> Result<(), mpsc::error::SendError<PollerCommand>> {
        self.command_tx.send(PollerCommand::Wake).await
    }

    /// Stops the poller.
    pub async fn stop(&self) -> Result<(), mpsc::error::SendError<PollerCommand>> {
        self.command_tx.send(PollerCommand::Stop).await
    }

    /// Returns a copy of the current poller state.
    pub async fn state(&self) -> PollerState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FixedReminder;
    use crate::service::AlertService;
    use crate::sink::ChannelSink;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticSource {
        events: Vec<EventSnapshot>,
        calls: AtomicU32,
        fail_first: u32,
    }

    impl StaticSource {
        fn new(events: Vec<EventSnapshot>, fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                events,
                calls: AtomicU32::new(0),
                fail_first,
            })
        }
    }

    impl EventSource for StaticSource {
        fn name(&self) -> &str {
            "static"
        }

        fn fetch_events(
            &self,
            _now: DateTime<Utc>,
        ) -> BoxFuture<'_, Result<Vec<EventSnapshot>, SourceError>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst);
                if n < self.fail_first {
                    Err(SourceError::parse("static", format!("failure {}", n)))
                } else {
                    Ok(self.events.clone())
                }
            })
        }
    }

    fn later_event() -> EventSnapshot {
        let start = Utc::now() + chrono::Duration::minutes(30);
        EventSnapshot::new("later", "Planning", start, start + chrono::Duration::hours(1))
            .with_alarm_offsets(vec![-300])
    }

    #[test]
    fn config_default() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(300));
        assert_eq!(config.wake_check_interval, Duration::from_secs(15));
        assert_eq!(config.wake_threshold, Duration::from_secs(30));
    }

    #[test]
    fn config_backoff_delay() {
        let config = PollerConfig::default().with_backoff(
            Duration::from_secs(5),
            Duration::from_secs(600),
            2.0,
        );

        assert_eq!(config.backoff_delay(0), Duration::ZERO);
        assert_eq!(config.backoff_delay(1), Duration::from_secs(5));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(10));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(20));

        // Capped at the poll interval.
        assert_eq!(config.backoff_delay(12), Duration::from_secs(300));
        assert_eq!(config.backoff_delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn clock_jump_detection() {
        let threshold = Duration::from_secs(30);

        assert_eq!(
            detect_clock_jump(
                chrono::Duration::seconds(15),
                Duration::from_secs(15),
                threshold
            ),
            None
        );
        assert_eq!(
            detect_clock_jump(
                chrono::Duration::seconds(40),
                Duration::from_secs(15),
                threshold
            ),
            None
        );
        assert_eq!(
            detect_clock_jump(
                chrono::Duration::seconds(3615),
                Duration::from_secs(15),
                threshold
            ),
            Some(chrono::Duration::seconds(3600))
        );
        // Wall clock set back by an hour.
        assert_eq!(
            detect_clock_jump(
                chrono::Duration::seconds(-3585),
                Duration::from_secs(15),
                threshold
            ),
            Some(chrono::Duration::seconds(-3600))
        );
    }

    #[test]
    fn state_records() {
        let mut state = PollerState::default();
        state.record_failure("boom");
        state.record_failure("boom again");
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(state.last_error.as_deref(), Some("boom again"));
        assert!(state.last_sync.is_none());

        state.record_success(3);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.last_event_count, 3);
        assert!(state.last_error.is_none());
        assert!(state.last_sync.is_some());
    }

    #[tokio::test]
    async fn poller_syncs_into_engine() {
        let (sink, _rx) = ChannelSink::new();
        let service = AlertService::new(Arc::new(sink), FixedReminder(None));
        let engine = service.handle();
        let service_task = tokio::spawn(service.run());

        let source = StaticSource::new(vec![later_event()], 0);
        let poller = Poller::new(
            PollerConfig::new(Duration::from_secs(60)),
            source.clone(),
            engine.clone(),
        );
        let handle = poller.handle();
        let poller_task = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.status().await.unwrap().active_timers, 1);

        handle.sync_now().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.state().await.last_event_count, 1);

        handle.stop().await.unwrap();
        poller_task.await.unwrap();
        engine.stop().await.unwrap();
        service_task.await.unwrap();
    }

    #[tokio::test]
    async fn wake_invalidates_and_resyncs() {
        let (sink, _rx) = ChannelSink::new();
        let service = AlertService::new(Arc::new(sink), FixedReminder(None));
        let engine = service.handle();
        let service_task = tokio::spawn(service.run());

        let source = StaticSource::new(vec![later_event()], 0);
        let poller = Poller::new(PollerConfig::default(), source.clone(), engine.clone());
        let handle = poller.handle();
        let poller_task = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.wake().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.state().await.wakes, 1);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        // Re-armed from scratch by the post-wake reconcile.
        assert_eq!(engine.status().await.unwrap().active_timers, 1);

        handle.stop().await.unwrap();
        poller_task.await.unwrap();
        engine.stop().await.unwrap();
        service_task.await.unwrap();
    }

    #[tokio::test]
    async fn poller_backs_off_and_recovers() {
        let (sink, _rx) = ChannelSink::new();
        let service = AlertService::new(Arc::new(sink), FixedReminder(None));
        let engine = service.handle();
        let service_task = tokio::spawn(service.run());

        let source = StaticSource::new(vec![later_event()], 3);
        let config = PollerConfig::new(Duration::from_secs(60)).with_backoff(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
        );
        let poller = Poller::new(config, source.clone(), engine.clone());
        let handle = poller.handle();
        let poller_task = tokio::spawn(poller.run());

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(source.calls.load(Ordering::SeqCst) >= 4);
        let state = handle.state().await;
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(engine.status().await.unwrap().active_timers, 1);

        handle.stop().await.unwrap();
        poller_task.await.unwrap();
        engine.stop().await.unwrap();
        service_task.await.unwrap();
    }
}
