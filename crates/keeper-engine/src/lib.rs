//! Trigger keeper engine.
//!
//! Periodically scans every market for resting trigger orders whose
//! condition holds at the current reference price and submits a trigger for
//! each one, at most once per order while an attempt is outstanding.
//!
//! Shared state and its guards:
//! - single-flight lock: at most one scan cycle at a time
//! - snapshot lock: the current order book snapshot and its in-dispatch flags
//! - account index lock: the account index handle, swapped by resyncs
//! - resync state lock: the slot of the last throttled resync
//! - cooldown registry: concurrent map of outstanding perpetual attempts
//!
//! Locks are always taken in that order.

pub mod clock;
pub mod config;
pub mod cooldown;
pub mod dispatch;
pub mod error;
pub mod in_dispatch;
pub mod index;
pub mod keeper;
pub mod liveness;
pub mod locks;
pub mod refresher;
pub mod scanner;
pub mod snapshot;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::KeeperConfig;
pub use cooldown::{AttemptId, CooldownCheck, CooldownEntry, CooldownRegistry};
pub use dispatch::{DispatchOutcome, DispatchTicket, Dispatcher, OutcomeHandler};
pub use error::{EngineError, EngineResult, ScanError};
pub use in_dispatch::InDispatchFlags;
pub use index::{AccountIndexHandle, SharedAccountIndex};
pub use keeper::{CycleOutcome, KeeperDeps, KeeperHandle, TriggerKeeper};
pub use liveness::Liveness;
pub use locks::{
    DynLockObserver, LockEvent, LockName, LockObserver, LockOutcome, NamedGuard, NamedMutex,
    NamedRwLock, NamedSyncMutex, RecordingLockObserver, TracingLockObserver,
};
pub use refresher::{AccountIndexRefresher, ResyncDecision};
pub use scanner::{MarketScanner, ScanReport, ScanSummary};
pub use snapshot::{RebuildOutcome, SnapshotGuard, SnapshotHandle, SnapshotManager, SnapshotSlot};
