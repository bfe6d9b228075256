//! Engine error types.

use keeper_core::{MarketKey, MarketKind, Price};
use keeper_venue::VenueError;
use thiserror::Error;

use crate::locks::LockName;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{lock} lock timed out after {timeout_ms}ms")]
    LockTimeout { lock: LockName, timeout_ms: u64 },

    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Cycle task failed: {0}")]
    CycleTask(String),

    #[error("Scheduler task failed: {0}")]
    Scheduler(String),
}

impl EngineError {
    /// Lock timeouts skip a cycle; they never escalate to the host.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failures isolated to one market scan (or one market kind).
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("reference price unavailable for {market}: {source}")]
    ReferencePrice {
        market: MarketKey,
        #[source]
        source: VenueError,
    },

    #[error("non-positive reference price {price} for {market}")]
    InvalidReferencePrice { market: MarketKey, price: Price },

    #[error("snapshot lock timed out scanning {market}")]
    SnapshotLockTimeout { market: MarketKey },

    #[error("no snapshot installed while scanning {market}")]
    NoSnapshot { market: MarketKey },

    #[error("listing {kind} markets failed: {source}")]
    MarketListing {
        kind: MarketKind,
        #[source]
        source: VenueError,
    },

    #[error("venue state unavailable: {0}")]
    VenueState(#[source] VenueError),
}

impl ScanError {
    /// Lock timeouts are metered but not alerted.
    #[must_use]
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::SnapshotLockTimeout { .. })
    }
}
