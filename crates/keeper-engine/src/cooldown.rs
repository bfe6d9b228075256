//! Per-order trigger cooldown registry.
//!
//! An entry exists for an order signature while a trigger attempt is in
//! flight. Each entry is tagged with the attempt that created it, so only
//! that attempt's completion removes it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use keeper_core::OrderSignature;

/// Identity of one trigger attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttemptId(pub u64);

/// One in-flight trigger attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownEntry {
    /// When the attempt started (Unix milliseconds).
    pub started_at_ms: u64,
    pub attempt: AttemptId,
}

/// Result of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownCheck {
    /// No entry, or the entry is older than the window.
    Clear,
    /// An attempt started `elapsed_ms` ago, inside the window.
    Active { elapsed_ms: u64 },
}

/// Concurrent store of in-flight trigger attempts.
#[derive(Debug)]
pub struct CooldownRegistry {
    entries: DashMap<OrderSignature, CooldownEntry>,
    next_attempt: AtomicU64,
    window_ms: u64,
}

impl CooldownRegistry {
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            next_attempt: AtomicU64::new(1),
            window_ms: window.as_millis() as u64,
        }
    }

    /// Check whether `signature` is inside its cooldown window at `now_ms`.
    pub fn check(&self, signature: &OrderSignature, now_ms: u64) -> CooldownCheck {
        match self.entries.get(signature) {
            Some(entry) => {
                let elapsed_ms = now_ms.saturating_sub(entry.started_at_ms);
                if elapsed_ms < self.window_ms {
                    CooldownCheck::Active { elapsed_ms }
                } else {
                    CooldownCheck::Clear
                }
            }
            None => CooldownCheck::Clear,
        }
    }

    /// Record the start of a new attempt, replacing any stale entry.
    pub fn begin(&self, signature: OrderSignature, now_ms: u64) -> AttemptId {
        let attempt = AttemptId(self.next_attempt.fetch_add(1, Ordering::SeqCst));
        self.entries.insert(
            signature,
            CooldownEntry {
                started_at_ms: now_ms,
                attempt,
            },
        );
        attempt
    }

    /// Remove the entry created by `attempt`.
    ///
    /// Returns false if the entry is gone or belongs to another attempt.
    pub fn finish(&self, signature: &OrderSignature, attempt: AttemptId) -> bool {
        self.entries
            .remove_if(signature, |_, entry| entry.attempt == attempt)
            .is_some()
    }

    #[must_use]
    pub fn get(&self, signature: &OrderSignature) -> Option<CooldownEntry> {
        self.entries.get(signature).map(|e| *e)
    }

    #[must_use]
    pub fn contains(&self, signature: &OrderSignature) -> bool {
        self.entries.contains_key(signature)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
