//! Order book snapshot manager.
//!
//! One snapshot is live at a time. Every rebuild discards the previous one
//! and installs the new snapshot together with a fresh set of in-dispatch
//! flags and a new generation number.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use keeper_telemetry::Metrics;
use keeper_venue::{OrderBookSnapshot, SnapshotBuilder, VenueError};
use tokio::sync::MutexGuard;
use tracing::{debug, warn};

use crate::error::EngineResult;
use crate::in_dispatch::InDispatchFlags;
use crate::index::SharedAccountIndex;
use crate::locks::{DynLockObserver, LockName, LockOutcome, NamedGuard, NamedMutex};

/// The installed snapshot of one generation.
pub struct SnapshotSlot {
    generation: u64,
    index_generation: u64,
    snapshot: Arc<dyn OrderBookSnapshot>,
    in_dispatch: Arc<InDispatchFlags>,
}

impl SnapshotSlot {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the account index the snapshot was built from.
    #[must_use]
    pub fn index_generation(&self) -> u64 {
        self.index_generation
    }

    #[must_use]
    pub fn snapshot(&self) -> &Arc<dyn OrderBookSnapshot> {
        &self.snapshot
    }

    #[must_use]
    pub fn in_dispatch(&self) -> &Arc<InDispatchFlags> {
        &self.in_dispatch
    }
}

/// Shared read handle to an installed snapshot.
pub type SnapshotHandle = Arc<SnapshotSlot>;

/// Result of a snapshot rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    Rebuilt { generation: u64, orders: usize },
    /// Lock acquisition plus build exceeded the timeout; no snapshot is installed.
    TimedOut,
}

/// Guard over the installed snapshot.
pub type SnapshotGuard<'a> = NamedGuard<MutexGuard<'a, Option<SnapshotHandle>>>;

/// Owns the snapshot lock and the current snapshot.
pub struct SnapshotManager {
    name: String,
    current: NamedMutex<Option<SnapshotHandle>>,
    builder: Arc<dyn SnapshotBuilder>,
    accounts: Arc<SharedAccountIndex>,
    next_generation: AtomicU64,
    timeout_ms: AtomicU64,
}

impl SnapshotManager {
    pub fn new(
        name: impl Into<String>,
        builder: Arc<dyn SnapshotBuilder>,
        accounts: Arc<SharedAccountIndex>,
        timeout: Duration,
        observer: DynLockObserver,
    ) -> Self {
        Self {
            name: name.into(),
            current: NamedMutex::new(LockName::Snapshot, None, observer),
            builder,
            accounts,
            next_generation: AtomicU64::new(1),
            timeout_ms: AtomicU64::new(timeout.as_millis() as u64),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Replace the timeout. Applies from the next acquisition.
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms.store(timeout.as_millis() as u64, Ordering::Relaxed);
    }

    /// Discard the current snapshot and build a new one from the account index.
    ///
    /// The account-index lock is taken inside the snapshot lock. Acquisition
    /// and build together are bounded by the snapshot timeout. A build error
    /// is returned to the caller.
    pub async fn rebuild(&self) -> EngineResult<RebuildOutcome> {
        let started = Instant::now();
        let timeout = self.timeout();
        let deadline = tokio::time::Instant::now() + timeout;

        let mut current = match self.current.lock_within(timeout).await {
            LockOutcome::Acquired(guard) => guard,
            LockOutcome::Busy | LockOutcome::TimedOut => return Ok(self.timed_out()),
        };
        current.take();

        let built = tokio::time::timeout_at(deadline, async {
            let accounts = self.accounts.read().await;
            let snapshot = self.builder.build(accounts.index().as_ref()).await?;
            Ok::<_, VenueError>((snapshot, accounts.generation()))
        })
        .await;

        let (snapshot, index_generation) = match built {
            Ok(result) => result?,
            Err(_) => {
                self.current.report_timeout();
                return Ok(self.timed_out());
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let orders = snapshot.order_count();
        *current = Some(Arc::new(SnapshotSlot {
            generation,
            index_generation,
            snapshot,
            in_dispatch: Arc::new(InDispatchFlags::new(generation)),
        }));

        debug!(
            generation,
            index_generation,
            orders,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Snapshot rebuilt"
        );
        Ok(RebuildOutcome::Rebuilt { generation, orders })
    }

    /// Acquire the snapshot lock within the snapshot timeout.
    pub async fn lock_current(&self) -> LockOutcome<SnapshotGuard<'_>> {
        let outcome = self.current.lock_within(self.timeout()).await;
        if matches!(outcome, LockOutcome::TimedOut) {
            Metrics::lock_timeout(&self.name, LockName::Snapshot.as_str());
        }
        outcome
    }

    /// Read-only handle to the installed snapshot, if any.
    pub async fn current_snapshot(&self) -> Option<SnapshotHandle> {
        self.current.lock().await.clone()
    }

    fn timed_out(&self) -> RebuildOutcome {
        Metrics::lock_timeout(&self.name, LockName::Snapshot.as_str());
        warn!(
            bot = %self.name,
            timeout_ms = self.timeout().as_millis() as u64,
            "Snapshot rebuild timed out"
        );
        RebuildOutcome::TimedOut
    }
}
