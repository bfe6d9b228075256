//! Chain slot tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keeper_core::Slot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::VenueResult;
use crate::venue::BoxFuture;

/// Monotonic source of the current chain slot.
pub trait SlotSource: Send + Sync {
    fn current_slot(&self) -> Slot;
}

/// Remote endpoint reporting the latest slot.
pub trait SlotFetcher: Send + Sync {
    fn fetch_slot(&self) -> BoxFuture<'_, VenueResult<Slot>>;
}

/// Atomic slot cache, refreshed by a background poller.
///
/// Updates never move the slot backwards.
#[derive(Debug, Default)]
pub struct SlotTracker {
    slot: AtomicU64,
}

impl SlotTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed slot. Older slots are ignored.
    pub fn observe(&self, slot: Slot) {
        self.slot.fetch_max(slot.get(), Ordering::SeqCst);
    }

    /// Spawn a poller refreshing this tracker until `shutdown` is cancelled.
    ///
    /// Fetch failures are logged and retried on the next tick.
    pub fn spawn_poller(
        self: Arc<Self>,
        fetcher: Arc<dyn SlotFetcher>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(poll_interval_ms = poll_interval.as_millis() as u64, "Slot poller started");
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => {
                        info!("Slot poller stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        match fetcher.fetch_slot().await {
                            Ok(slot) => {
                                self.observe(slot);
                                debug!(%slot, "Slot refreshed");
                            }
                            Err(e) => warn!(error = %e, "Slot fetch failed"),
                        }
                    }
                }
            }
        })
    }
}

impl SlotSource for SlotTracker {
    fn current_slot(&self) -> Slot {
        Slot(self.slot.load(Ordering::SeqCst))
    }
}
