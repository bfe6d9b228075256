//! Liveness signal patted by every completed scan cycle.

use std::time::Duration;

use tokio::sync::watch;

use crate::locks::{DynLockObserver, LockName, NamedSyncMutex};

/// Last time a scan cycle completed.
pub struct Liveness {
    last_pat_ms: NamedSyncMutex<Option<u64>>,
    completed_tx: watch::Sender<u64>,
}

impl Liveness {
    pub fn new(observer: DynLockObserver) -> Self {
        let (completed_tx, _) = watch::channel(0);
        Self {
            last_pat_ms: NamedSyncMutex::new(LockName::Liveness, None, observer),
            completed_tx,
        }
    }

    /// Record a completed cycle.
    pub fn pat(&self, now_ms: u64) {
        *self.last_pat_ms.lock() = Some(now_ms);
        self.completed_tx.send_modify(|completed| *completed += 1);
    }

    #[must_use]
    pub fn last_pat_ms(&self) -> Option<u64> {
        *self.last_pat_ms.lock()
    }

    /// Whether a cycle completed within `window` of `now_ms`.
    #[must_use]
    pub fn is_alive(&self, now_ms: u64, window: Duration) -> bool {
        match self.last_pat_ms() {
            Some(last) => now_ms.saturating_sub(last) < window.as_millis() as u64,
            None => false,
        }
    }

    /// Number of completed cycles so far.
    #[must_use]
    pub fn completed_cycles(&self) -> u64 {
        *self.completed_tx.borrow()
    }

    /// Watch completed cycle counts.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.completed_tx.subscribe()
    }
}
