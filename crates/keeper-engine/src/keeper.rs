//! Trigger keeper: periodic scheduler and host-facing API.
//!
//! One cycle:
//! 1. take the single-flight lock (skip the tick if a cycle is running)
//! 2. rebuild the snapshot from the account index
//! 3. start an account index resync if the index is out of sync
//! 4. scan every market concurrently, dispatching triggers
//! 5. record the cycle duration and pat the liveness signal

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use keeper_core::{AccountEvent, Slot};
use keeper_telemetry::Metrics;
use keeper_venue::{
    AccountIndexFactory, DynAlertSink, DynVenueClient, LogAlertSink, SlotSource, SnapshotBuilder,
};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::KeeperConfig;
use crate::cooldown::CooldownRegistry;
use crate::dispatch::{Dispatcher, OutcomeHandler};
use crate::error::{EngineError, EngineResult};
use crate::index::SharedAccountIndex;
use crate::liveness::Liveness;
use crate::locks::{DynLockObserver, LockName, LockOutcome, NamedMutex, TracingLockObserver};
use crate::refresher::{AccountIndexRefresher, ResyncDecision};
use crate::scanner::{MarketScanner, ScanSummary};
use crate::snapshot::{RebuildOutcome, SnapshotHandle, SnapshotManager};

// ============================================================================
// KeeperDeps
// ============================================================================

/// Collaborators of a keeper.
pub struct KeeperDeps {
    pub venue: DynVenueClient,
    pub account_factory: Arc<dyn AccountIndexFactory>,
    pub snapshot_builder: Arc<dyn SnapshotBuilder>,
    /// Slot subscriber used for scanning.
    pub slots: Arc<dyn SlotSource>,
    /// Slot-tracking account loader used to throttle resyncs.
    pub loader_slots: Option<Arc<dyn SlotSource>>,
    pub alerts: DynAlertSink,
    pub clock: Arc<dyn Clock>,
    pub lock_observer: DynLockObserver,
}

impl KeeperDeps {
    /// Required collaborators; alerts go to the log, time is the system clock.
    pub fn new(
        venue: DynVenueClient,
        account_factory: Arc<dyn AccountIndexFactory>,
        snapshot_builder: Arc<dyn SnapshotBuilder>,
        slots: Arc<dyn SlotSource>,
    ) -> Self {
        Self {
            venue,
            account_factory,
            snapshot_builder,
            slots,
            loader_slots: None,
            alerts: Arc::new(LogAlertSink),
            clock: Arc::new(SystemClock),
            lock_observer: Arc::new(TracingLockObserver),
        }
    }

    pub fn with_loader_slots(mut self, loader_slots: Arc<dyn SlotSource>) -> Self {
        self.loader_slots = Some(loader_slots);
        self
    }

    pub fn with_alerts(mut self, alerts: DynAlertSink) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_lock_observer(mut self, observer: DynLockObserver) -> Self {
        self.lock_observer = observer;
        self
    }
}

// ============================================================================
// CycleOutcome / KeeperHandle
// ============================================================================

/// Result of one `run_cycle` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Completed {
        generation: u64,
        resync: ResyncDecision,
        summary: ScanSummary,
        duration_ms: u64,
    },
    /// Another cycle held the single-flight lock; nothing ran.
    Busy,
    /// The snapshot lock timed out; the cycle was skipped.
    LockTimedOut,
}

/// Handle to a running scheduler.
pub struct KeeperHandle {
    shutdown: CancellationToken,
    task: JoinHandle<EngineResult<()>>,
}

impl KeeperHandle {
    /// Request a cooperative shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the scheduler to stop. An escalated cycle failure is returned here.
    pub async fn join(self) -> EngineResult<()> {
        self.task
            .await
            .map_err(|e| EngineError::Scheduler(e.to_string()))?
    }
}

// ============================================================================
// TriggerKeeper
// ============================================================================

struct Inner {
    config: KeeperConfig,
    venue: DynVenueClient,
    alerts: DynAlertSink,
    clock: Arc<dyn Clock>,
    single_flight: NamedMutex<()>,
    accounts: Arc<SharedAccountIndex>,
    refresher: AccountIndexRefresher,
    snapshots: Arc<SnapshotManager>,
    cooldowns: Arc<CooldownRegistry>,
    outcomes: Arc<OutcomeHandler>,
    scanner: Arc<MarketScanner>,
    liveness: Liveness,
    /// Scheduling interval. Set from the config and replaced by `start`.
    interval_ms: AtomicU64,
}

/// Periodic trigger keeper. Cheap to clone.
#[derive(Clone)]
pub struct TriggerKeeper {
    inner: Arc<Inner>,
}

impl TriggerKeeper {
    /// Wire a keeper and spawn its outcome handler.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: KeeperConfig, deps: KeeperDeps) -> Self {
        let name = config.name.clone();
        let observer = deps.lock_observer;

        let accounts = Arc::new(SharedAccountIndex::new(
            deps.account_factory.create(),
            Arc::clone(&observer),
        ));
        let refresher = AccountIndexRefresher::new(
            name.clone(),
            Arc::clone(&deps.venue),
            Arc::clone(&deps.account_factory),
            Arc::clone(&accounts),
            deps.loader_slots,
            config.resync_cooldown_slots,
            config.resync_log_every_slots,
            Arc::clone(&observer),
        );
        let snapshots = Arc::new(SnapshotManager::new(
            name.clone(),
            deps.snapshot_builder,
            Arc::clone(&accounts),
            config.snapshot_lock_timeout(),
            Arc::clone(&observer),
        ));
        let cooldowns = Arc::new(CooldownRegistry::new(config.trigger_cooldown));

        let outcomes = Arc::new(OutcomeHandler::new(
            name.clone(),
            deps.venue.identity(),
            Arc::clone(&cooldowns),
            Arc::clone(&deps.alerts),
        ));
        let (outcome_tx, outcome_rx) = mpsc::channel(config.outcome_channel_capacity);
        tokio::spawn(Arc::clone(&outcomes).run(outcome_rx));

        let dispatcher = Arc::new(Dispatcher::new(
            name.clone(),
            Arc::clone(&deps.venue),
            outcome_tx,
            Arc::clone(&outcomes),
            config.dry_run,
        ));
        let scanner = Arc::new(MarketScanner::new(
            name,
            Arc::clone(&deps.venue),
            Arc::clone(&snapshots),
            Arc::clone(&accounts),
            Arc::clone(&cooldowns),
            dispatcher,
            deps.slots,
            Arc::clone(&deps.clock),
            Arc::clone(&deps.alerts),
        ));

        Self {
            inner: Arc::new(Inner {
                single_flight: NamedMutex::new(LockName::SingleFlight, (), Arc::clone(&observer)),
                liveness: Liveness::new(observer),
                interval_ms: AtomicU64::new(config.interval.as_millis() as u64),
                config,
                venue: deps.venue,
                alerts: deps.alerts,
                clock: deps.clock,
                accounts,
                refresher,
                snapshots,
                cooldowns,
                outcomes,
                scanner,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &KeeperConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// Current scheduling interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.inner.interval_ms.load(Ordering::Relaxed))
    }

    fn set_interval(&self, interval: Duration) {
        self.inner
            .interval_ms
            .store(interval.as_millis() as u64, Ordering::Relaxed);
        self.inner
            .snapshots
            .set_timeout(interval * self.inner.config.snapshot_lock_timeout_intervals);
    }

    /// Build the initial account index.
    pub async fn init(&self) -> EngineResult<()> {
        info!(bot = %self.name(), "Keeper initializing");
        self.inner.refresher.init().await
    }

    /// Run one scan cycle unless another one is running.
    pub async fn run_cycle(&self) -> EngineResult<CycleOutcome> {
        let started = Instant::now();
        let name = self.name();

        let _flight = match self.inner.single_flight.try_lock() {
            LockOutcome::Acquired(guard) => guard,
            LockOutcome::Busy | LockOutcome::TimedOut => {
                Metrics::mutex_busy(name);
                debug!(bot = %name, "Previous cycle still running, tick skipped");
                return Ok(CycleOutcome::Busy);
            }
        };

        match self.cycle_body().await {
            Ok((generation, resync, summary)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                let now_ms = self.inner.clock.now_ms();
                Metrics::cycle_duration(name, duration_ms as f64);
                Metrics::last_cycle_timestamp(name, now_ms as f64);
                self.inner.liveness.pat(now_ms);
                debug!(
                    bot = %name,
                    generation,
                    duration_ms,
                    markets = summary.markets_scanned,
                    dispatched = summary.report.dispatched,
                    "Cycle completed"
                );
                Ok(CycleOutcome::Completed {
                    generation,
                    resync,
                    summary,
                    duration_ms,
                })
            }
            Err(e) if e.is_benign() => {
                warn!(bot = %name, error = %e, "Cycle skipped");
                Ok(CycleOutcome::LockTimedOut)
            }
            Err(e) => {
                error!(bot = %name, error = %e, "Uncaught error in scan cycle");
                self.inner.alerts.notify(format!(
                    "[{name}]: :x: Uncaught error in main loop:\n{e}"
                ));
                Err(e)
            }
        }
    }

    /// Cycle body; the caller holds the single-flight lock.
    async fn cycle_body(&self) -> EngineResult<(u64, ResyncDecision, ScanSummary)> {
        let generation = match self.inner.snapshots.rebuild().await? {
            RebuildOutcome::Rebuilt { generation, .. } => generation,
            RebuildOutcome::TimedOut => {
                return Err(EngineError::LockTimeout {
                    lock: LockName::Snapshot,
                    timeout_ms: self.inner.snapshots.timeout().as_millis() as u64,
                });
            }
        };

        let resync = match self.inner.refresher.resync_if_needed().await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(bot = %self.name(), error = %e, "Resync check failed");
                ResyncDecision::InSync
            }
        };

        let summary = self.inner.scanner.scan_all().await;
        Ok((generation, resync, summary))
    }

    /// Spawn the periodic scheduler. The first cycle runs immediately.
    ///
    /// `interval` replaces the configured interval, so the liveness window
    /// and the snapshot lock timeout scale with it.
    ///
    /// Every tick spawns a cycle; a tick that lands while a cycle is still
    /// running observes the busy single-flight lock. An escalated cycle
    /// failure or a panicking cycle stops the scheduler and is returned from
    /// [`KeeperHandle::join`].
    pub fn start(&self, interval: Duration) -> KeeperHandle {
        self.set_interval(interval);
        let shutdown = CancellationToken::new();
        let keeper = self.clone();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { keeper.run_scheduler(interval, token).await });
        info!(bot = %self.name(), interval_ms = interval.as_millis() as u64, "Keeper started");
        KeeperHandle { shutdown, task }
    }

    async fn run_scheduler(
        self,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> EngineResult<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut cycles: JoinSet<EngineResult<CycleOutcome>> = JoinSet::new();

        loop {
            tokio::select! {
                biased;

                () = shutdown.cancelled() => {
                    info!(bot = %self.name(), "Shutdown requested, waiting for running cycle");
                    while cycles.join_next().await.is_some() {}
                    info!(bot = %self.name(), "Keeper stopped");
                    return Ok(());
                }
                Some(joined) = cycles.join_next(), if !cycles.is_empty() => {
                    match joined {
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => {
                            error!(bot = %self.name(), error = %e, "Keeper stopping on cycle failure");
                            return Err(e);
                        }
                        Err(e) => {
                            error!(bot = %self.name(), error = %e, "Scan cycle task failed");
                            self.inner.alerts.notify(format!(
                                "[{}]: :x: Scan cycle task failed:\n{}",
                                self.name(),
                                e
                            ));
                            return Err(EngineError::CycleTask(e.to_string()));
                        }
                    }
                }
                _ = ticker.tick() => {
                    let keeper = self.clone();
                    cycles.spawn(async move { keeper.run_cycle().await });
                }
            }
        }
    }

    /// Healthy iff a cycle completed within the liveness window and the
    /// account index size equals the venue's subaccount count.
    pub async fn health_check(&self) -> bool {
        let now_ms = self.inner.clock.now_ms();
        if !self
            .inner
            .liveness
            .is_alive(now_ms, self.interval() * self.inner.config.liveness_intervals)
        {
            return false;
        }

        let expected = match self.inner.venue.venue_state().await {
            Ok(state) => state.subaccount_count,
            Err(e) => {
                warn!(bot = %self.name(), error = %e, "Health check could not read venue state");
                return false;
            }
        };
        self.inner.accounts.size().await as u64 == expected
    }

    /// Apply an incremental account event to the current index.
    pub async fn on_account_event(&self, event: &AccountEvent) -> EngineResult<()> {
        self.inner.refresher.on_account_event(event).await
    }

    /// Read-only handle to the current snapshot.
    pub async fn current_snapshot(&self) -> Option<SnapshotHandle> {
        self.inner.snapshots.current_snapshot().await
    }

    /// Start a resync if needed, outside of a cycle.
    pub async fn resync_if_needed(&self) -> EngineResult<ResyncDecision> {
        self.inner.refresher.resync_if_needed().await
    }

    /// Wait for a background account index rebuild, if one is running.
    pub async fn wait_for_resync(&self) {
        self.inner.refresher.wait_for_rebuild().await;
    }

    pub async fn last_resync_slot(&self) -> Slot {
        self.inner.refresher.last_resync_slot().await
    }

    pub async fn account_index_size(&self) -> usize {
        self.inner.accounts.size().await
    }

    pub async fn account_index_generation(&self) -> u64 {
        self.inner.accounts.generation().await
    }

    #[must_use]
    pub fn cooldowns(&self) -> &Arc<CooldownRegistry> {
        &self.inner.cooldowns
    }

    /// Dispatched triggers whose outcome has not been handled yet.
    #[must_use]
    pub fn in_flight_triggers(&self) -> usize {
        self.inner.outcomes.in_flight()
    }

    #[must_use]
    pub fn liveness(&self) -> &Liveness {
        &self.inner.liveness
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_venue::mock::{
        ManualSlotSource, MockAccountSource, MockSnapshotBuilder, MockVenueClient,
    };
    use keeper_venue::MemoryAccountIndexFactory;

    fn keeper(name: &str) -> TriggerKeeper {
        let deps = KeeperDeps::new(
            Arc::new(MockVenueClient::new()),
            Arc::new(MemoryAccountIndexFactory::new(Arc::new(MockAccountSource::new(
                Vec::new(),
            )))),
            Arc::new(MockSnapshotBuilder::new()),
            Arc::new(ManualSlotSource::new(Slot(0))),
        );
        TriggerKeeper::new(
            KeeperConfig {
                name: name.to_string(),
                ..KeeperConfig::default()
            },
            deps,
        )
    }

    #[tokio::test]
    async fn test_cycle_on_empty_venue() {
        let keeper = keeper("keeper-unit-empty");
        keeper.init().await.unwrap();

        let outcome = keeper.run_cycle().await.unwrap();
        match outcome {
            CycleOutcome::Completed {
                generation,
                resync,
                summary,
                ..
            } => {
                assert_eq!(generation, 1);
                assert_eq!(resync, ResyncDecision::InSync);
                assert_eq!(summary, ScanSummary::default());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(keeper.liveness().completed_cycles(), 1);
        assert_eq!(keeper.in_flight_triggers(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_token_stops_scheduler() {
        let keeper = keeper("keeper-unit-shutdown");
        keeper.init().await.unwrap();

        let handle = keeper.start(Duration::from_millis(10));
        assert_eq!(keeper.interval(), Duration::from_millis(10));
        assert_eq!(keeper.inner.snapshots.timeout(), Duration::from_millis(100));
        handle.shutdown_token().cancel();
        handle.join().await.unwrap();
    }
}
