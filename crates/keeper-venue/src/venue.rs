//! Venue client trait.
//!
//! Abstracts every remote call the keeper makes to the venue so the engine
//! can be driven by the HTTP gateway client in production and by
//! `mock::MockVenueClient` in tests.

use std::pin::Pin;
use std::sync::Arc;

use keeper_core::{
    AccountId, AccountRecord, Market, MarketIndex, MarketKind, Price, TriggerOrder, TxRef,
    VenueState,
};

use crate::error::{SubmitError, VenueResult};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Remote venue operations used by the keeper.
pub trait VenueClient: Send + Sync {
    /// Reference (oracle) price of one market.
    fn reference_price(
        &self,
        kind: MarketKind,
        index: MarketIndex,
    ) -> BoxFuture<'_, VenueResult<Price>>;

    /// All listed markets of one kind.
    fn list_markets(&self, kind: MarketKind) -> BoxFuture<'_, VenueResult<Vec<Market>>>;

    /// Authoritative subaccount count and exchange status.
    fn venue_state(&self) -> BoxFuture<'_, VenueResult<VenueState>>;

    /// Submit a trigger transaction for one order of one account.
    fn submit_trigger<'a>(
        &'a self,
        account: &'a AccountId,
        record: &'a AccountRecord,
        order: &'a TriggerOrder,
    ) -> BoxFuture<'a, Result<TxRef, SubmitError>>;

    /// Identity (wallet) that signs trigger submissions.
    fn identity(&self) -> &str;
}

/// Arc wrapper for VenueClient trait objects.
pub type DynVenueClient = Arc<dyn VenueClient>;
