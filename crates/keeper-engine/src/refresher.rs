//! Account index refresher.
//!
//! Keeps the account index in line with the venue's authoritative
//! subaccount count. When the counts differ, a full rebuild is started in
//! the background, throttled to one per `resync_cooldown_slots` slots when
//! a slot-tracking account loader is available.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use keeper_core::{AccountEvent, Slot};
use keeper_telemetry::Metrics;
use keeper_venue::{AccountIndexFactory, DynAccountIndex, DynVenueClient, SlotSource};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::index::SharedAccountIndex;
use crate::locks::{DynLockObserver, LockName, NamedMutex};

/// What `resync_if_needed` decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResyncDecision {
    /// Index size matches the authoritative count.
    InSync,
    /// Inside the slot cooldown.
    Deferred { slots_remaining: u64 },
    /// A background rebuild was started. `at_slot` is `None` without a slot-tracking loader.
    Started { at_slot: Option<Slot> },
    /// A previous rebuild is still running.
    AlreadyRunning,
}

#[derive(Debug, Default)]
struct ResyncState {
    last_resync_slot: Slot,
}

/// Clears the rebuild flag when the rebuild task ends, panics included.
struct RebuildFlag(Arc<AtomicBool>);

impl Drop for RebuildFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Builds, resyncs and incrementally updates the account index.
pub struct AccountIndexRefresher {
    name: String,
    venue: DynVenueClient,
    factory: Arc<dyn AccountIndexFactory>,
    accounts: Arc<SharedAccountIndex>,
    loader_slots: Option<Arc<dyn SlotSource>>,
    resync_state: NamedMutex<ResyncState>,
    rebuilding: Arc<AtomicBool>,
    rebuild_task: Mutex<Option<JoinHandle<()>>>,
    cooldown_slots: u64,
    log_every_slots: u64,
}

impl AccountIndexRefresher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        venue: DynVenueClient,
        factory: Arc<dyn AccountIndexFactory>,
        accounts: Arc<SharedAccountIndex>,
        loader_slots: Option<Arc<dyn SlotSource>>,
        cooldown_slots: u64,
        log_every_slots: u64,
        observer: DynLockObserver,
    ) -> Self {
        Self {
            name: name.into(),
            venue,
            factory,
            accounts,
            loader_slots,
            resync_state: NamedMutex::new(LockName::ResyncState, ResyncState::default(), observer),
            rebuilding: Arc::new(AtomicBool::new(false)),
            rebuild_task: Mutex::new(None),
            cooldown_slots,
            log_every_slots,
        }
    }

    /// Build the initial account index.
    pub async fn init(&self) -> EngineResult<()> {
        let started = Instant::now();
        let index = self.factory.create();
        let generation = self.accounts.populate_and_install(index).await?;
        let size = self.accounts.size().await;
        Metrics::account_index_size(&self.name, size);
        info!(
            bot = %self.name,
            generation,
            size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Account index initialized"
        );
        Ok(())
    }

    /// Start a background rebuild if the index size differs from the venue's count.
    pub async fn resync_if_needed(&self) -> EngineResult<ResyncDecision> {
        let size = self.accounts.size().await as u64;
        let expected = self.venue.venue_state().await?.subaccount_count;
        if size == expected {
            return Ok(ResyncDecision::InSync);
        }

        let mut state = self.resync_state.lock().await;
        if self.rebuilding.load(Ordering::SeqCst) {
            debug!(bot = %self.name, "Account index rebuild already running");
            return Ok(ResyncDecision::AlreadyRunning);
        }

        let at_slot = match &self.loader_slots {
            None => {
                info!(bot = %self.name, "Resyncing account index immediately (no slot tracking)");
                None
            }
            Some(slots) => {
                let current = slots.current_slot();
                let next_allowed = state.last_resync_slot + self.cooldown_slots;
                if current < next_allowed {
                    let slots_remaining = current.until(next_allowed);
                    if self.log_every_slots > 0 && slots_remaining % self.log_every_slots == 0 {
                        info!(
                            bot = %self.name,
                            slots_remaining,
                            slot = %current,
                            "Account index resync in cooldown"
                        );
                    }
                    return Ok(ResyncDecision::Deferred { slots_remaining });
                }
                state.last_resync_slot = current;
                Some(current)
            }
        };

        info!(bot = %self.name, size, expected, "Resyncing account index");
        self.rebuilding.store(true, Ordering::SeqCst);
        let task = tokio::spawn(rebuild_index(
            self.name.clone(),
            Arc::clone(&self.factory),
            Arc::clone(&self.accounts),
            RebuildFlag(Arc::clone(&self.rebuilding)),
        ));
        *self.rebuild_task.lock() = Some(task);

        Ok(ResyncDecision::Started { at_slot })
    }

    /// Apply an incremental account event to the current index.
    ///
    /// May race with a background rebuild; the next resync reconciles.
    pub async fn on_account_event(&self, event: &AccountEvent) -> EngineResult<()> {
        let handle = self.accounts.read().await;
        handle.index().apply_event(event).await?;
        debug!(account = %event.account(), generation = handle.generation(), "Account event applied");
        Ok(())
    }

    /// Slot of the last throttled resync.
    pub async fn last_resync_slot(&self) -> Slot {
        self.resync_state.lock().await.last_resync_slot
    }

    #[must_use]
    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding.load(Ordering::SeqCst)
    }

    /// Wait for the most recently started rebuild, if any.
    pub async fn wait_for_rebuild(&self) {
        let task = self.rebuild_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(bot = %self.name, error = %e, "Account index rebuild task failed");
            }
        }
    }
}

async fn rebuild_index(
    name: String,
    factory: Arc<dyn AccountIndexFactory>,
    accounts: Arc<SharedAccountIndex>,
    _flag: RebuildFlag,
) {
    let started = Instant::now();
    let next = factory.create();

    match next.populate_all().await {
        Ok(()) => {
            let generation = accounts.swap(next).await;
            let size = accounts.size().await;
            Metrics::account_index_size(&name, size);
            Metrics::account_index_resync(&name, "swapped");
            info!(
                bot = %name,
                generation,
                size,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Account index resynced"
            );
        }
        Err(e) => {
            release_all(&next);
            Metrics::account_index_resync(&name, "failed");
            warn!(
                bot = %name,
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Account index resync failed, keeping current index"
            );
        }
    }
}

fn release_all(index: &DynAccountIndex) {
    for account in index.account_ids() {
        index.release(&account);
    }
}
