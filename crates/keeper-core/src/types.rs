//! Common types shared across the keeper: slots, venue state, candidates.

use crate::account::AccountId;
use crate::market::{MarketKey, MarketKind};
use crate::order::{OrderId, OrderSignature, TriggerOrder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Chain slot (monotonic logical clock of the venue).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slot(pub u64);

impl Slot {
    pub const ZERO: Self = Self(0);

    pub fn new(slot: u64) -> Self {
        Self(slot)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Slots remaining until `target` (zero once reached).
    pub fn until(&self, target: Slot) -> u64 {
        target.0.saturating_sub(self.0)
    }
}

impl Add<u64> for Slot {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0.saturating_add(rhs))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Venue-wide state relevant to triggering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VenueState {
    /// Authoritative number of user subaccounts registered on the venue.
    pub subaccount_count: u64,
    /// Whether the venue has paused order activation.
    #[serde(default)]
    pub exchange_paused: bool,
}

/// One resting order eligible for activation.
///
/// Produced fresh by every snapshot scan; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerCandidate {
    /// Owning account.
    pub account: AccountId,
    /// The order to activate.
    pub order: TriggerOrder,
}

impl TriggerCandidate {
    pub fn new(account: AccountId, order: TriggerOrder) -> Self {
        Self { account, order }
    }

    pub fn order_id(&self) -> OrderId {
        self.order.order_id
    }

    pub fn market(&self) -> MarketKey {
        self.order.market
    }

    pub fn kind(&self) -> MarketKind {
        self.order.market.kind
    }

    /// Stable signature of the (account, order id) pair.
    pub fn signature(&self) -> OrderSignature {
        OrderSignature::new(&self.account, self.order.order_id)
    }
}

/// Reference to a submitted transaction (signature / hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(pub String);

impl TxRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
