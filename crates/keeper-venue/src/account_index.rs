//! Account index: the in-memory mirror of on-chain user accounts.
//!
//! The keeper builds every snapshot from an account index and looks up the
//! full owning account before submitting a trigger. Indexes are created by
//! an `AccountIndexFactory` so the engine can build a replacement index
//! while the current one keeps serving reads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use keeper_core::{AccountEvent, AccountId, AccountRecord};
use tracing::{debug, trace};

use crate::error::VenueResult;
use crate::venue::BoxFuture;

/// Remote source of account records.
pub trait AccountSource: Send + Sync {
    /// Fetch every user account registered on the venue.
    fn fetch_all(&self) -> BoxFuture<'_, VenueResult<Vec<AccountRecord>>>;

    /// Fetch one account.
    fn fetch_account<'a>(
        &'a self,
        account: &'a AccountId,
    ) -> BoxFuture<'a, VenueResult<AccountRecord>>;
}

/// In-memory index of user accounts.
pub trait AccountIndex: Send + Sync {
    /// Load every account from the remote source.
    fn populate_all(&self) -> BoxFuture<'_, VenueResult<()>>;

    /// Number of accounts currently held.
    fn size(&self) -> usize;

    /// Release one account entity (drops its subscription and state).
    fn release(&self, account: &AccountId);

    /// Ids of every account currently held.
    fn account_ids(&self) -> Vec<AccountId>;

    /// Snapshot of every account record currently held.
    fn records(&self) -> Vec<AccountRecord>;

    /// Full record of one account, fetched from the source if not held yet.
    fn get<'a>(&'a self, account: &'a AccountId) -> BoxFuture<'a, VenueResult<AccountRecord>>;

    /// Apply one incremental account event.
    fn apply_event<'a>(&'a self, event: &'a AccountEvent) -> BoxFuture<'a, VenueResult<()>>;
}

/// Arc wrapper for AccountIndex trait objects.
pub type DynAccountIndex = Arc<dyn AccountIndex>;

/// Creates empty account indexes.
pub trait AccountIndexFactory: Send + Sync {
    fn create(&self) -> DynAccountIndex;
}

// ============================================================================
// MemoryAccountIndex
// ============================================================================

/// `DashMap`-backed account index populated from an `AccountSource`.
pub struct MemoryAccountIndex {
    source: Arc<dyn AccountSource>,
    accounts: DashMap<AccountId, AccountRecord>,
    /// Total entities released over the index lifetime.
    released: AtomicUsize,
}

impl MemoryAccountIndex {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self {
            source,
            accounts: DashMap::new(),
            released: AtomicUsize::new(0),
        }
    }

    /// Number of entities released so far.
    #[must_use]
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    fn upsert(&self, record: AccountRecord) {
        self.accounts.insert(record.account.clone(), record);
    }
}

impl AccountIndex for MemoryAccountIndex {
    fn populate_all(&self) -> BoxFuture<'_, VenueResult<()>> {
        Box::pin(async move {
            let records = self.source.fetch_all().await?;
            let count = records.len();
            for record in records {
                self.upsert(record);
            }
            debug!(count, size = self.accounts.len(), "Account index populated");
            Ok(())
        })
    }

    fn size(&self) -> usize {
        self.accounts.len()
    }

    fn release(&self, account: &AccountId) {
        if self.accounts.remove(account).is_some() {
            self.released.fetch_add(1, Ordering::SeqCst);
            trace!(%account, "Account released");
        }
    }

    fn account_ids(&self) -> Vec<AccountId> {
        self.accounts.iter().map(|e| e.key().clone()).collect()
    }

    fn records(&self) -> Vec<AccountRecord> {
        self.accounts.iter().map(|e| e.value().clone()).collect()
    }

    fn get<'a>(&'a self, account: &'a AccountId) -> BoxFuture<'a, VenueResult<AccountRecord>> {
        Box::pin(async move {
            if let Some(record) = self.accounts.get(account) {
                return Ok(record.clone());
            }
            let record = self.source.fetch_account(account).await?;
            self.upsert(record.clone());
            debug!(%account, "Account fetched on demand");
            Ok(record)
        })
    }

    fn apply_event<'a>(&'a self, event: &'a AccountEvent) -> BoxFuture<'a, VenueResult<()>> {
        Box::pin(async move {
            match event {
                AccountEvent::Created { account } => {
                    if !self.accounts.contains_key(account) {
                        let record = self.source.fetch_account(account).await?;
                        self.upsert(record);
                    }
                }
                AccountEvent::Updated { record } => self.upsert(record.clone()),
            }
            Ok(())
        })
    }
}

/// Factory for `MemoryAccountIndex` sharing one source.
pub struct MemoryAccountIndexFactory {
    source: Arc<dyn AccountSource>,
}

impl MemoryAccountIndexFactory {
    pub fn new(source: Arc<dyn AccountSource>) -> Self {
        Self { source }
    }
}

impl AccountIndexFactory for MemoryAccountIndexFactory {
    fn create(&self) -> DynAccountIndex {
        Arc::new(MemoryAccountIndex::new(Arc::clone(&self.source)))
    }
}
