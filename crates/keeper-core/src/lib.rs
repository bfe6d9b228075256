//! Core domain types for the trigger keeper.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - `MarketKey`: Market identifier (kind + index)
//! - `Price`: Precision-safe price type
//! - `Slot`: Chain slot clock
//! - `AccountId`, `AccountRecord`: Mirrored user accounts
//! - `TriggerOrder`, `TriggerCandidate`, `OrderSignature`: Conditional orders and their identity

pub mod account;
pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod types;

pub use account::{AccountEvent, AccountId, AccountRecord};
pub use decimal::Price;
pub use error::{CoreError, Result};
pub use market::{Market, MarketIndex, MarketKey, MarketKind};
pub use order::{OrderId, OrderSignature, TriggerCondition, TriggerOrder};
pub use types::{Slot, TriggerCandidate, TxRef, VenueState};
