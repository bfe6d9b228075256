//! Named locks.
//!
//! Every piece of shared keeper state sits behind a named lock. Acquisition
//! returns an explicit [`LockOutcome`] instead of an error, and every
//! acquisition, release and contention is reported to a [`LockObserver`].
//!
//! Acquisition order is fixed:
//! single-flight -> snapshot -> account-index -> resync-state.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

// ============================================================================
// LockName
// ============================================================================

/// Identity of a keeper lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LockName {
    /// Held for a whole scan cycle.
    SingleFlight,
    /// Guards the current order book snapshot.
    Snapshot,
    /// Guards the account index handle.
    AccountIndex,
    /// Guards the last resync slot.
    ResyncState,
    /// Guards the last cycle completion time.
    Liveness,
}

impl LockName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleFlight => "single_flight",
            Self::Snapshot => "snapshot",
            Self::AccountIndex => "account_index",
            Self::ResyncState => "resync_state",
            Self::Liveness => "liveness",
        }
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// LockOutcome
// ============================================================================

/// Result of a non-blocking or bounded lock acquisition.
#[derive(Debug)]
pub enum LockOutcome<G> {
    Acquired(G),
    /// Held by someone else (try-lock only).
    Busy,
    /// Not acquired within the timeout.
    TimedOut,
}

impl<G> LockOutcome<G> {
    #[must_use]
    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired(_))
    }

    pub fn into_guard(self) -> Option<G> {
        match self {
            Self::Acquired(guard) => Some(guard),
            Self::Busy | Self::TimedOut => None,
        }
    }
}

// ============================================================================
// LockObserver
// ============================================================================

/// One lock event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockEvent {
    Acquired(LockName),
    Released(LockName),
    Busy(LockName),
    TimedOut(LockName),
}

/// Receives every lock event.
pub trait LockObserver: Send + Sync {
    fn on_event(&self, event: LockEvent);
}

/// Arc wrapper for LockObserver trait objects.
pub type DynLockObserver = Arc<dyn LockObserver>;

/// Logs lock events at trace level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLockObserver;

impl LockObserver for TracingLockObserver {
    fn on_event(&self, event: LockEvent) {
        trace!(?event, "Lock event");
    }
}

/// Keeps every lock event, for asserting acquisition order in tests.
#[derive(Debug, Default)]
pub struct RecordingLockObserver {
    events: SyncMutex<Vec<LockEvent>>,
}

impl RecordingLockObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LockEvent> {
        self.events.lock().clone()
    }

    /// Number of times `lock` was acquired.
    pub fn acquisitions(&self, lock: LockName) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| **e == LockEvent::Acquired(lock))
            .count()
    }

    /// `(held, acquired)` pairs where `acquired` comes before `held` in the
    /// fixed order. Liveness is a leaf lock and is not ordered.
    ///
    /// Replays the event log, so it is only meaningful when the recorded
    /// acquisitions did not interleave across tasks.
    pub fn order_violations(&self) -> Vec<(LockName, LockName)> {
        let mut held: Vec<LockName> = Vec::new();
        let mut violations = Vec::new();
        for event in self.events.lock().iter() {
            match *event {
                LockEvent::Acquired(lock) => {
                    if lock != LockName::Liveness {
                        for outer in &held {
                            if *outer != LockName::Liveness && *outer > lock {
                                violations.push((*outer, lock));
                            }
                        }
                    }
                    held.push(lock);
                }
                LockEvent::Released(lock) => {
                    if let Some(pos) = held.iter().rposition(|h| *h == lock) {
                        held.remove(pos);
                    }
                }
                LockEvent::Busy(_) | LockEvent::TimedOut(_) => {}
            }
        }
        violations
    }
}

impl LockObserver for RecordingLockObserver {
    fn on_event(&self, event: LockEvent) {
        self.events.lock().push(event);
    }
}

// ============================================================================
// NamedGuard
// ============================================================================

/// Guard that reports its release to the observer.
pub struct NamedGuard<G> {
    guard: G,
    name: LockName,
    observer: DynLockObserver,
}

impl<G> NamedGuard<G> {
    fn new(guard: G, name: LockName, observer: DynLockObserver) -> Self {
        observer.on_event(LockEvent::Acquired(name));
        Self {
            guard,
            name,
            observer,
        }
    }
}

impl<G: Deref> Deref for NamedGuard<G> {
    type Target = G::Target;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl<G: DerefMut> DerefMut for NamedGuard<G> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl<G> Drop for NamedGuard<G> {
    fn drop(&mut self) {
        self.observer.on_event(LockEvent::Released(self.name));
    }
}

// ============================================================================
// NamedMutex / NamedRwLock / NamedSyncMutex
// ============================================================================

/// Async mutex with a name and an observer.
pub struct NamedMutex<T> {
    name: LockName,
    inner: Mutex<T>,
    observer: DynLockObserver,
}

impl<T> NamedMutex<T> {
    pub fn new(name: LockName, value: T, observer: DynLockObserver) -> Self {
        Self {
            name,
            inner: Mutex::new(value),
            observer,
        }
    }

    #[must_use]
    pub fn name(&self) -> LockName {
        self.name
    }

    /// Acquire without waiting.
    pub fn try_lock(&self) -> LockOutcome<NamedGuard<MutexGuard<'_, T>>> {
        match self.inner.try_lock() {
            Ok(guard) => LockOutcome::Acquired(self.wrap(guard)),
            Err(_) => {
                self.observer.on_event(LockEvent::Busy(self.name));
                LockOutcome::Busy
            }
        }
    }

    /// Acquire, waiting at most `timeout`.
    pub async fn lock_within(
        &self,
        timeout: Duration,
    ) -> LockOutcome<NamedGuard<MutexGuard<'_, T>>> {
        match tokio::time::timeout(timeout, self.inner.lock()).await {
            Ok(guard) => LockOutcome::Acquired(self.wrap(guard)),
            Err(_) => {
                self.observer.on_event(LockEvent::TimedOut(self.name));
                LockOutcome::TimedOut
            }
        }
    }

    /// Acquire, waiting as long as it takes.
    pub async fn lock(&self) -> NamedGuard<MutexGuard<'_, T>> {
        let guard = self.inner.lock().await;
        self.wrap(guard)
    }

    /// Report a timeout observed by a caller-side bound (e.g. around lock + work).
    pub fn report_timeout(&self) {
        self.observer.on_event(LockEvent::TimedOut(self.name));
    }

    fn wrap<'a>(&self, guard: MutexGuard<'a, T>) -> NamedGuard<MutexGuard<'a, T>> {
        NamedGuard::new(guard, self.name, Arc::clone(&self.observer))
    }
}

/// Async reader-writer lock with a name and an observer.
pub struct NamedRwLock<T> {
    name: LockName,
    inner: RwLock<T>,
    observer: DynLockObserver,
}

impl<T> NamedRwLock<T> {
    pub fn new(name: LockName, value: T, observer: DynLockObserver) -> Self {
        Self {
            name,
            inner: RwLock::new(value),
            observer,
        }
    }

    pub async fn read(&self) -> NamedGuard<RwLockReadGuard<'_, T>> {
        let guard = self.inner.read().await;
        NamedGuard::new(guard, self.name, Arc::clone(&self.observer))
    }

    pub async fn write(&self) -> NamedGuard<RwLockWriteGuard<'_, T>> {
        let guard = self.inner.write().await;
        NamedGuard::new(guard, self.name, Arc::clone(&self.observer))
    }
}

/// Blocking mutex for short critical sections that never span an await.
pub struct NamedSyncMutex<T> {
    name: LockName,
    inner: SyncMutex<T>,
    observer: DynLockObserver,
}

impl<T> NamedSyncMutex<T> {
    pub fn new(name: LockName, value: T, observer: DynLockObserver) -> Self {
        Self {
            name,
            inner: SyncMutex::new(value),
            observer,
        }
    }

    pub fn lock(&self) -> NamedGuard<parking_lot::MutexGuard<'_, T>> {
        let guard = self.inner.lock();
        NamedGuard::new(guard, self.name, Arc::clone(&self.observer))
    }
}
