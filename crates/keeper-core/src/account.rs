//! Mirrored user account types.

use crate::error::CoreError;
use crate::order::TriggerOrder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// On-chain address of a user (sub)account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AccountId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CoreError::InvalidAccountId(s.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Full mirrored state of one user account.
///
/// This is what the venue expects alongside the order when submitting a
/// trigger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub account: AccountId,
    /// Wallet that owns the account.
    pub authority: String,
    #[serde(default)]
    pub sub_account_id: u16,
    /// Resting conditional orders.
    #[serde(default)]
    pub orders: Vec<TriggerOrder>,
}

impl AccountRecord {
    pub fn new(account: AccountId, authority: impl Into<String>) -> Self {
        Self {
            account,
            authority: authority.into(),
            sub_account_id: 0,
            orders: Vec::new(),
        }
    }

    pub fn with_orders(mut self, orders: Vec<TriggerOrder>) -> Self {
        self.orders = orders;
        self
    }
}

/// Incremental account update observed by the host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AccountEvent {
    /// A new account was created on-chain; its state must be fetched.
    Created { account: AccountId },
    /// Fresh state of an account (order placed, cancelled, filled, ...).
    Updated { record: AccountRecord },
}

impl AccountEvent {
    pub fn account(&self) -> &AccountId {
        match self {
            Self::Created { account } => account,
            Self::Updated { record } => &record.account,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_parse_rejects_empty() {
        assert!("  ".parse::<AccountId>().is_err());
        assert_eq!(" abc ".parse::<AccountId>().unwrap().as_str(), "abc");
    }

    #[test]
    fn test_account_event_serde() {
        let event = AccountEvent::Created {
            account: AccountId::new("abc"),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"created","account":"abc"}"#);
        assert_eq!(event.account().as_str(), "abc");
    }
}
