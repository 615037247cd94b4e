//! The collection service: scheduling state, the single-flight run
//! guard, counters, and the connect-read-format-write cycle.

use crate::error::PlcError;
use crate::plc::{format_reading, AddressMap, ProtocolClient, Reading};
use crate::store::TimeSeriesStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Smallest accepted collection interval; shorter requests are clamped.
pub const MIN_INTERVAL_SECS: u64 = 1;

/// Outcome of `start`/`stop` control operations.
#[derive(Debug, Clone, Serialize)]
pub struct ControlReply {
    pub success: bool,
    pub message: String,
}

impl ControlReply {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Snapshot of the service state, available at any time without
/// touching the run guard.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    pub running: bool,
    pub interval_secs: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub success_count: u64,
    pub error_count: u64,
}

/// Result of one successful cycle, returned by `read_now`.
#[derive(Debug, Clone, Serialize)]
pub struct CycleOutcome {
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
}

/// Handle to the recurring timer task. Owned exclusively by the
/// service; dropping the sender stops future ticks.
struct TimerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Periodic PLC collection service.
///
/// Owns one protocol client and one store adapter (constructor
/// injection, so tests can substitute stubs), a recurring timer, and
/// the run guard that keeps at most one cycle in flight. Shared across
/// the web layer behind an `Arc`.
pub struct CollectorService {
    client: Arc<dyn ProtocolClient>,
    store: Arc<dyn TimeSeriesStore>,
    address_map: AddressMap,

    running: AtomicBool,
    interval_secs: AtomicU64,
    success_count: AtomicU64,
    error_count: AtomicU64,
    last_success: std::sync::Mutex<Option<DateTime<Utc>>>,
    timer: std::sync::Mutex<Option<TimerHandle>>,
    /// Single-flight run guard. Counters and `last_success` are only
    /// mutated while this is held.
    cycle_guard: AsyncMutex<()>,
}

impl CollectorService {
    pub fn new(
        client: Arc<dyn ProtocolClient>,
        store: Arc<dyn TimeSeriesStore>,
        address_map: AddressMap,
    ) -> Self {
        Self {
            client,
            store,
            address_map,
            running: AtomicBool::new(false),
            interval_secs: AtomicU64::new(crate::DEFAULT_INTERVAL_SECS),
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            last_success: std::sync::Mutex::new(None),
            timer: std::sync::Mutex::new(None),
            cycle_guard: AsyncMutex::new(()),
        }
    }

    /// Start periodic collection: one immediate cycle, then a tick
    /// every `interval_secs`. Rejected without side effects when
    /// already running.
    pub fn start(self: Arc<Self>, interval_secs: u64) -> ControlReply {
        let mut timer = self.timer.lock().expect("timer lock poisoned");
        if self.running.load(Ordering::SeqCst) {
            return ControlReply::rejected("service is already running");
        }

        let interval_secs = interval_secs.max(MIN_INTERVAL_SECS);
        self.interval_secs.store(interval_secs, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let service = Arc::clone(&self);
        let task = tokio::spawn(service.run_schedule(interval_secs, shutdown_rx));
        *timer = Some(TimerHandle {
            shutdown: shutdown_tx,
            task,
        });

        info!(interval_secs, "collection service started");
        ControlReply::ok(format!(
            "service started with interval: {interval_secs} seconds"
        ))
    }

    /// Stop periodic collection. An in-flight cycle finishes on its
    /// own; only future ticks are cancelled. Rejected without side
    /// effects when not running.
    pub fn stop(&self) -> ControlReply {
        let mut timer = self.timer.lock().expect("timer lock poisoned");
        if !self.running.load(Ordering::SeqCst) {
            return ControlReply::rejected("service is not running");
        }

        if let Some(handle) = timer.take() {
            // The schedule loop observes the signal between cycles, so
            // a running cycle is never interrupted mid-flight.
            let _ = handle.shutdown.send(true);
            drop(handle.task);
        }
        self.running.store(false, Ordering::SeqCst);

        info!("collection service stopped");
        ControlReply::ok("service stopped")
    }

    /// Current state. Never blocks on the run guard.
    pub fn status(&self) -> CollectorStatus {
        CollectorStatus {
            running: self.running.load(Ordering::SeqCst),
            interval_secs: self.interval_secs.load(Ordering::SeqCst),
            last_success: *self.last_success.lock().expect("last_success poisoned"),
            success_count: self.success_count.load(Ordering::SeqCst),
            error_count: self.error_count.load(Ordering::SeqCst),
        }
    }

    /// Run one out-of-band cycle and return its result. Shares the run
    /// guard with scheduled ticks: if a cycle is in flight the call is
    /// rejected immediately with [`PlcError::Busy`] rather than queued.
    pub async fn read_now(&self) -> Result<CycleOutcome, PlcError> {
        let guard = self.cycle_guard.try_lock().map_err(|_| PlcError::Busy)?;
        let outcome = self.run_cycle_locked().await;
        drop(guard);
        outcome
    }

    /// The recurring schedule: one immediate cycle, then fixed-interval
    /// ticks until the shutdown signal flips.
    async fn run_schedule(self: Arc<Self>, interval_secs: u64, mut shutdown: watch::Receiver<bool>) {
        let period = Duration::from_secs(interval_secs);

        self.scheduled_cycle().await;

        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.scheduled_cycle().await,
                _ = shutdown.changed() => {
                    debug!("schedule loop exiting");
                    break;
                }
            }
        }
    }

    /// A timer-driven cycle. If the guard is held (a slow cycle or a
    /// `read_now` is still in flight) the tick is skipped, never run in
    /// parallel, and nothing is counted.
    async fn scheduled_cycle(&self) {
        let Ok(guard) = self.cycle_guard.try_lock() else {
            debug!("tick skipped: cycle already in flight");
            return;
        };
        if let Err(e) = self.run_cycle_locked().await {
            warn!(error = %e, "collection cycle failed");
        }
        drop(guard);
    }

    /// One connect-read-format-write cycle. Caller must hold the run
    /// guard. Counter updates happen here, strictly inside the guard.
    async fn run_cycle_locked(&self) -> Result<CycleOutcome, PlcError> {
        let result = self.collect_once().await;
        match &result {
            Ok(outcome) => {
                self.success_count.fetch_add(1, Ordering::SeqCst);
                *self.last_success.lock().expect("last_success poisoned") =
                    Some(outcome.timestamp);
                debug!(channels = outcome.reading.len(), "cycle complete");
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::SeqCst);
                debug!(error = %e, "cycle failed");
            }
        }
        result
    }

    /// The cycle body. A connect failure returns before the store is
    /// ever touched; a write failure still counts as a performed read.
    async fn collect_once(&self) -> Result<CycleOutcome, PlcError> {
        let raw = self.client.read_all(&self.address_map.addresses()).await?;
        let timestamp = Utc::now();
        let reading = format_reading(&raw, &self.address_map, timestamp);
        self.store.write(&reading).await?;
        Ok(CycleOutcome { timestamp, reading })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plc::{Address, RawValue};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    /// Client stub: configurable failure and per-call latency.
    struct StubClient {
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubClient {
        fn ok() -> Self {
            Self {
                fail: false,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::ok()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl ProtocolClient for StubClient {
        async fn read_all(
            &self,
            addresses: &[Address],
        ) -> Result<HashMap<Address, RawValue>, PlcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail {
                return Err(PlcError::connect("stub: connection refused"));
            }
            Ok(addresses
                .iter()
                .map(|a| (*a, RawValue::Real(21.5)))
                .collect())
        }
    }

    /// Store stub recording every write.
    struct StubStore {
        writes: std::sync::Mutex<Vec<Reading>>,
        fail_writes: bool,
    }

    impl StubStore {
        fn new() -> Self {
            Self {
                writes: std::sync::Mutex::new(Vec::new()),
                fail_writes: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl TimeSeriesStore for StubStore {
        async fn write(&self, reading: &Reading) -> Result<(), PlcError> {
            if self.fail_writes {
                return Err(PlcError::write("stub: store unreachable"));
            }
            self.writes.lock().unwrap().push(reading.clone());
            Ok(())
        }

        async fn query_range(
            &self,
            _category: crate::store::Category,
            _range: crate::store::TimeRange,
        ) -> Result<Vec<crate::store::SeriesPoint>, PlcError> {
            Ok(Vec::new())
        }

        async fn latest(&self) -> Result<Option<crate::store::SeriesPoint>, PlcError> {
            Ok(None)
        }
    }

    fn service_with(client: StubClient, store: StubStore) -> Arc<CollectorService> {
        Arc::new(CollectorService::new(
            Arc::new(client),
            Arc::new(store),
            AddressMap::s7_1200_default(),
        ))
    }

    #[tokio::test]
    async fn test_read_now_success_updates_counters() {
        let service = service_with(StubClient::ok(), StubStore::new());
        let outcome = service.read_now().await.unwrap();
        assert_eq!(outcome.reading.get("T1"), Some(21.5));

        let status = service.status();
        assert_eq!(status.success_count, 1);
        assert_eq!(status.error_count, 0);
        assert!(status.last_success.is_some());
        assert!(!status.running);
    }

    #[tokio::test]
    async fn test_connect_failure_never_touches_store() {
        let service = service_with(StubClient::failing(), StubStore::new());
        let err = service.read_now().await.unwrap_err();
        assert!(matches!(err, PlcError::Connect(_)));

        let status = service.status();
        assert_eq!(status.success_count, 0);
        assert_eq!(status.error_count, 1);
        assert!(status.last_success.is_none());
    }

    #[tokio::test]
    async fn test_write_failure_counts_as_cycle_error() {
        let service = service_with(StubClient::ok(), StubStore::failing());
        let err = service.read_now().await.unwrap_err();
        assert!(matches!(err, PlcError::Write(_)));
        assert_eq!(service.status().error_count, 1);
    }

    #[tokio::test]
    async fn test_start_twice_rejected_without_mutation() {
        let service = service_with(StubClient::ok(), StubStore::new());
        assert!(service.clone().start(5).success);

        let before = service.status();
        let reply = service.clone().start(60);
        assert!(!reply.success);
        assert_eq!(service.status().interval_secs, before.interval_secs);

        service.stop();
    }

    #[tokio::test]
    async fn test_stop_when_stopped_rejected() {
        let service = service_with(StubClient::ok(), StubStore::new());
        let reply = service.stop();
        assert!(!reply.success);
        assert!(!service.status().running);
    }

    #[tokio::test]
    async fn test_interval_clamped_to_minimum() {
        let service = service_with(StubClient::ok(), StubStore::new());
        service.clone().start(0);
        assert_eq!(service.status().interval_secs, MIN_INTERVAL_SECS);
        service.stop();
    }

    #[tokio::test]
    async fn test_read_now_rejected_while_cycle_in_flight() {
        let service = service_with(
            StubClient::slow(Duration::from_millis(300)),
            StubStore::new(),
        );

        let slow = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.read_now().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let err = service.read_now().await.unwrap_err();
        assert!(matches!(err, PlcError::Busy));

        slow.await.unwrap().unwrap();
        // Exactly one cycle counted for the overlapping window.
        let status = service.status();
        assert_eq!(status.success_count + status.error_count, 1);
    }

    #[tokio::test]
    async fn test_slow_cycle_skips_overlapping_ticks() {
        let service = service_with(
            StubClient::slow(Duration::from_millis(2500)),
            StubStore::new(),
        );

        // Hold the run guard with an out-of-band read, then start the
        // schedule underneath it.
        let slow = {
            let service = Arc::clone(&service);
            tokio::spawn(async move { service.read_now().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        service.clone().start(1);

        // The immediate cycle and the ticks at 1s and 2s all fall
        // inside the slow read. Skipped ticks move no counters.
        tokio::time::sleep(Duration::from_millis(2000)).await;
        let status = service.status();
        assert_eq!(
            status.success_count + status.error_count,
            0,
            "status: {status:?}"
        );

        // Once the slow read completes, exactly one cycle is counted.
        slow.await.unwrap().unwrap();
        let status = service.status();
        assert_eq!(
            status.success_count + status.error_count,
            1,
            "status: {status:?}"
        );

        service.stop();
    }

    #[tokio::test]
    async fn test_scheduled_run_immediate_cycle_then_ticks() {
        let service = service_with(StubClient::ok(), StubStore::new());
        service.clone().start(1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let status = service.status();
        assert!(
            status.success_count >= 2,
            "expected immediate cycle plus at least one tick, got {}",
            status.success_count
        );

        service.stop();
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_schedule() {
        let service = service_with(StubClient::failing(), StubStore::new());
        service.clone().start(1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        let status = service.status();
        assert!(status.error_count >= 2, "got {}", status.error_count);
        assert_eq!(status.success_count, 0);
        assert!(status.running, "scheduler must survive cycle errors");

        service.stop();
    }

    #[tokio::test]
    async fn test_stop_prevents_future_ticks() {
        let service = service_with(StubClient::ok(), StubStore::new());
        service.clone().start(1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        service.stop();

        let counted = service.status().success_count;
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert_eq!(service.status().success_count, counted);
    }
}
