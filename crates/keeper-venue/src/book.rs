//! Order book snapshot of resting trigger orders.

use std::collections::HashMap;
use std::sync::Arc;

use keeper_core::{
    AccountId, MarketIndex, MarketKey, MarketKind, Price, Slot, TriggerCandidate, TriggerOrder,
    VenueState,
};
use tracing::trace;

use crate::account_index::AccountIndex;
use crate::error::VenueResult;
use crate::venue::BoxFuture;

/// Point-in-time, read-only view of resting trigger orders.
pub trait OrderBookSnapshot: Send + Sync {
    /// Orders of one market whose activation condition holds.
    fn find_trigger_candidates(
        &self,
        market: MarketIndex,
        slot: Slot,
        reference_price: Price,
        kind: MarketKind,
        state: &VenueState,
    ) -> Vec<TriggerCandidate>;

    /// Total resting trigger orders held by the snapshot.
    fn order_count(&self) -> usize;
}

/// Builds snapshots from an account index.
pub trait SnapshotBuilder: Send + Sync {
    fn build<'a>(
        &'a self,
        index: &'a dyn AccountIndex,
    ) -> BoxFuture<'a, VenueResult<Arc<dyn OrderBookSnapshot>>>;
}

/// In-memory snapshot grouping untriggered orders per market.
#[derive(Debug, Default)]
pub struct TriggerBook {
    orders: HashMap<MarketKey, Vec<(AccountId, TriggerOrder)>>,
}

impl TriggerBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one resting order. Orders already triggered are ignored.
    pub fn insert(&mut self, account: AccountId, order: TriggerOrder) {
        if order.triggered {
            return;
        }
        self.orders
            .entry(order.market)
            .or_default()
            .push((account, order));
    }

    /// Number of markets with at least one resting order.
    #[must_use]
    pub fn market_count(&self) -> usize {
        self.orders.len()
    }
}

impl OrderBookSnapshot for TriggerBook {
    fn find_trigger_candidates(
        &self,
        market: MarketIndex,
        slot: Slot,
        reference_price: Price,
        kind: MarketKind,
        state: &VenueState,
    ) -> Vec<TriggerCandidate> {
        if state.exchange_paused {
            return Vec::new();
        }

        let key = MarketKey::new(kind, market);
        let candidates: Vec<TriggerCandidate> = self
            .orders
            .get(&key)
            .map(|orders| {
                orders
                    .iter()
                    .filter(|(_, order)| order.is_triggerable(reference_price))
                    .map(|(account, order)| TriggerCandidate::new(account.clone(), order.clone()))
                    .collect()
            })
            .unwrap_or_default();

        trace!(
            market = %key,
            %slot,
            %reference_price,
            candidates = candidates.len(),
            "Trigger candidates evaluated"
        );
        candidates
    }

    fn order_count(&self) -> usize {
        self.orders.values().map(Vec::len).sum()
    }
}

/// Builds a `TriggerBook` from every record in the account index.
#[derive(Debug, Default, Clone, Copy)]
pub struct TriggerBookBuilder;

impl TriggerBookBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build synchronously from the index's current records.
    pub fn build_book(&self, index: &dyn AccountIndex) -> TriggerBook {
        let mut book = TriggerBook::new();
        for record in index.records() {
            for order in record.orders {
                book.insert(record.account.clone(), order);
            }
        }
        book
    }
}

impl SnapshotBuilder for TriggerBookBuilder {
    fn build<'a>(
        &'a self,
        index: &'a dyn AccountIndex,
    ) -> BoxFuture<'a, VenueResult<Arc<dyn OrderBookSnapshot>>> {
        Box::pin(async move {
            let book = self.build_book(index);
            Ok(Arc::new(book) as Arc<dyn OrderBookSnapshot>)
        })
    }
}
