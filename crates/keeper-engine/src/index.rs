//! Swappable account index handle.

use keeper_venue::{DynAccountIndex, VenueResult};
use tracing::debug;

use crate::locks::{DynLockObserver, LockName, NamedGuard, NamedRwLock};

/// The current account index, tagged with its generation.
pub struct AccountIndexHandle {
    generation: u64,
    index: DynAccountIndex,
}

impl AccountIndexHandle {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn index(&self) -> &DynAccountIndex {
        &self.index
    }
}

/// Account index behind the account-index lock.
///
/// Reads (snapshot builds, account lookups, incremental events) take the
/// read side; only [`SharedAccountIndex::swap`] takes the write side.
pub struct SharedAccountIndex {
    lock: NamedRwLock<AccountIndexHandle>,
}

impl SharedAccountIndex {
    /// Wrap an initial index as generation 0.
    pub fn new(index: DynAccountIndex, observer: DynLockObserver) -> Self {
        Self {
            lock: NamedRwLock::new(
                LockName::AccountIndex,
                AccountIndexHandle {
                    generation: 0,
                    index,
                },
                observer,
            ),
        }
    }

    pub async fn read(
        &self,
    ) -> NamedGuard<tokio::sync::RwLockReadGuard<'_, AccountIndexHandle>> {
        self.lock.read().await
    }

    /// Clone the current index out of the lock.
    pub async fn current(&self) -> DynAccountIndex {
        self.lock.read().await.index.clone()
    }

    pub async fn size(&self) -> usize {
        self.lock.read().await.index.size()
    }

    pub async fn generation(&self) -> u64 {
        self.lock.read().await.generation
    }

    /// Populate `next` while holding the write side, then install it.
    ///
    /// On failure the current index is kept. Returns the new generation.
    pub async fn populate_and_install(&self, next: DynAccountIndex) -> VenueResult<u64> {
        let mut handle = self.lock.write().await;
        next.populate_all().await?;
        Ok(Self::install(&mut handle, next))
    }

    /// Release every entity of the current index and install `next`.
    ///
    /// Returns the new generation.
    pub async fn swap(&self, next: DynAccountIndex) -> u64 {
        let mut handle = self.lock.write().await;
        Self::install(&mut handle, next)
    }

    fn install(handle: &mut AccountIndexHandle, next: DynAccountIndex) -> u64 {
        let old_ids = handle.index.account_ids();
        for account in &old_ids {
            handle.index.release(account);
        }
        handle.index = next;
        handle.generation += 1;
        debug!(
            released = old_ids.len(),
            generation = handle.generation,
            size = handle.index.size(),
            "Account index swapped"
        );
        handle.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::TracingLockObserver;
    use keeper_core::{AccountId, AccountRecord};
    use keeper_venue::mock::MockAccountSource;
    use keeper_venue::{AccountIndex, MemoryAccountIndex};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_swap_releases_old_index() {
        let source = Arc::new(MockAccountSource::new(vec![
            AccountRecord::new(AccountId::new("a"), "x"),
            AccountRecord::new(AccountId::new("b"), "x"),
        ]));
        let old = Arc::new(MemoryAccountIndex::new(source.clone()));
        old.populate_all().await.unwrap();

        let shared = SharedAccountIndex::new(old.clone(), Arc::new(TracingLockObserver));
        assert_eq!(shared.size().await, 2);

        let next = Arc::new(MemoryAccountIndex::new(source));
        next.populate_all().await.unwrap();
        let generation = shared.swap(next).await;

        assert_eq!(generation, 1);
        assert_eq!(old.size(), 0);
        assert_eq!(old.released_count(), 2);
        assert_eq!(shared.size().await, 2);
        assert_eq!(shared.generation().await, 1);
    }
}
