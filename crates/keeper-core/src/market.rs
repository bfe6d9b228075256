//! Market identification types.
//!
//! The venue lists two families of markets, perpetual and spot, each with
//! its own index space. A market is therefore identified by both.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Market family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    /// Perpetual futures market.
    Perp,
    /// Spot market.
    Spot,
}

impl MarketKind {
    /// All market kinds, in scan order.
    pub const ALL: [MarketKind; 2] = [MarketKind::Perp, MarketKind::Spot];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Perp => "perp",
            Self::Spot => "spot",
        }
    }
}

impl fmt::Display for MarketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MarketKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "perp" => Ok(Self::Perp),
            "spot" => Ok(Self::Spot),
            other => Err(CoreError::InvalidMarketKind(other.to_string())),
        }
    }
}

/// Market index within one market family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketIndex(pub u16);

impl MarketIndex {
    pub fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for MarketIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique market identifier combining kind and index.
///
/// Format: `{kind}-{index}` (e.g., "perp-0" for the first perpetual market).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub kind: MarketKind,
    pub index: MarketIndex,
}

impl MarketKey {
    pub fn new(kind: MarketKind, index: MarketIndex) -> Self {
        Self { kind, index }
    }

    pub fn perp(index: u16) -> Self {
        Self::new(MarketKind::Perp, MarketIndex(index))
    }

    pub fn spot(index: u16) -> Self {
        Self::new(MarketKind::Spot, MarketIndex(index))
    }
}

impl fmt::Display for MarketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind, self.index)
    }
}

/// A market listed by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub key: MarketKey,
    /// Human readable symbol (e.g., "SOL-PERP").
    #[serde(default)]
    pub name: String,
}

impl Market {
    pub fn new(key: MarketKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
        }
    }

    pub fn kind(&self) -> MarketKind {
        self.key.kind
    }

    pub fn index(&self) -> MarketIndex {
        self.key.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_key_display() {
        assert_eq!(MarketKey::perp(3).to_string(), "perp-3");
        assert_eq!(MarketKey::spot(0).to_string(), "spot-0");
    }

    #[test]
    fn test_market_kind_parse() {
        assert_eq!("perp".parse::<MarketKind>().unwrap(), MarketKind::Perp);
        assert_eq!("spot".parse::<MarketKind>().unwrap(), MarketKind::Spot);
        assert!("future".parse::<MarketKind>().is_err());
    }

    #[test]
    fn test_market_kind_serde() {
        let json = serde_json::to_string(&MarketKind::Spot).unwrap();
        assert_eq!(json, "\"spot\"");
    }
}
