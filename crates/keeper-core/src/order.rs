//! Conditional (trigger) order types and identifiers.

use crate::account::AccountId;
use crate::decimal::Price;
use crate::market::MarketKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue-assigned order id, unique within one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub u32);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Price condition that activates a conditional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerCondition {
    /// Activates once the reference price rises above the trigger price.
    Above,
    /// Activates once the reference price falls below the trigger price.
    Below,
}

impl TriggerCondition {
    /// Check whether the condition holds for the given reference price.
    pub fn is_met(&self, reference: Price, trigger_price: Price) -> bool {
        match self {
            Self::Above => reference > trigger_price,
            Self::Below => reference < trigger_price,
        }
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Above => write!(f, "above"),
            Self::Below => write!(f, "below"),
        }
    }
}

/// A resting conditional order as mirrored from the owning account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerOrder {
    pub order_id: OrderId,
    pub market: MarketKey,
    pub condition: TriggerCondition,
    pub trigger_price: Price,
    /// Set by the venue once the order has been activated.
    #[serde(default)]
    pub triggered: bool,
}

impl TriggerOrder {
    /// Whether this order should be activated at the given reference price.
    pub fn is_triggerable(&self, reference: Price) -> bool {
        !self.triggered && self.condition.is_met(reference, self.trigger_price)
    }
}

/// Stable order signature used for deduplication.
///
/// Derived deterministically from the owning account and the order id, so
/// the same resting order yields the same signature in every snapshot.
/// Format: `{account}-{order_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderSignature(String);

impl OrderSignature {
    pub fn new(account: &AccountId, order_id: OrderId) -> Self {
        Self(format!("{account}-{order_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
