//! Precision-safe decimal price type.
//!
//! Uses `rust_decimal` for exact decimal arithmetic so that trigger
//! comparisons never suffer from floating-point rounding.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Price with exact decimal precision.
///
/// Wraps `Decimal` so that oracle prices and trigger prices cannot be
/// confused with plain numbers in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_parse_and_order() {
        let low: Price = "24.5".parse().unwrap();
        let high: Price = "24.51".parse().unwrap();
        assert!(matches!("abc".parse::<Price>(), Err(CoreError::DecimalParse(_))));
        assert!(low < high);
        assert!(low.is_positive());
        assert!(!Price::ZERO.is_positive());
        assert_eq!(high.inner(), dec!(24.51));
    }

    #[test]
    fn test_price_serde_transparent() {
        let price = Price::new(dec!(1850.25));
        let json = serde_json::to_string(&price).unwrap();
        assert_eq!(json, "\"1850.25\"");
        let back: Price = serde_json::from_str(&json).unwrap();
        assert_eq!(back, price);
    }
}
