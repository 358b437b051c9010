//! The stock adjustment rule.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockroom_core::DomainError;

/// Direction of a stock movement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    In,
    Out,
}

impl MovementType {
    /// Accepts `in`, `out`, `stock in`, `stock out` in any case; `-` and `_`
    /// count as spaces.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['-', '_'], " ");
        let words: Vec<&str> = normalized.split_whitespace().collect();

        match words.as_slice() {
            ["in"] | ["stock", "in"] => Ok(MovementType::In),
            ["out"] | ["stock", "out"] => Ok(MovementType::Out),
            _ => Err(DomainError::validation(format!(
                "invalid movement type '{}' (expected 'in' or 'out')",
                raw.trim()
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "in",
            MovementType::Out => "out",
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Strictly positive movement quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(i64);

impl Quantity {
    pub fn new(value: i64) -> Result<Self, DomainError> {
        if value <= 0 {
            return Err(DomainError::validation(format!(
                "quantity must be greater than zero (got {value})"
            )));
        }
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for i64 {
    fn from(q: Quantity) -> Self {
        q.0
    }
}

/// New balance after moving `quantity` in `direction`.
///
/// An `Out` larger than the current balance fails with `InsufficientStock`.
pub fn apply_movement(stock: i64, direction: MovementType, quantity: Quantity) -> Result<i64, DomainError> {
    let q = quantity.get();
    match direction {
        MovementType::In => stock
            .checked_add(q)
            .ok_or_else(|| DomainError::validation("stock level would overflow")),
        MovementType::Out => {
            let next = stock - q;
            if next < 0 {
                return Err(DomainError::insufficient_stock(stock, q));
            }
            Ok(next)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_canonical_and_ui_vocabulary() {
        assert_eq!(MovementType::parse("in").unwrap(), MovementType::In);
        assert_eq!(MovementType::parse("Stock In").unwrap(), MovementType::In);
        assert_eq!(MovementType::parse(" stock-out ").unwrap(), MovementType::Out);
        assert_eq!(MovementType::parse("STOCK_OUT").unwrap(), MovementType::Out);
        assert_eq!(MovementType::parse("OUT").unwrap(), MovementType::Out);
    }

    #[test]
    fn parse_rejects_anything_else() {
        for raw in ["", "adjust", "stock", "in out", "stockin"] {
            match MovementType::parse(raw) {
                Err(DomainError::Validation(_)) => {}
                other => panic!("Expected Validation for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn quantity_must_be_positive() {
        assert!(Quantity::new(0).is_err());
        assert!(Quantity::new(-3).is_err());
        assert_eq!(Quantity::new(7).unwrap().get(), 7);
    }

    #[test]
    fn stock_in_adds() {
        assert_eq!(apply_movement(10, MovementType::In, Quantity::new(5).unwrap()).unwrap(), 15);
    }

    #[test]
    fn stock_out_to_exactly_zero_is_allowed() {
        assert_eq!(apply_movement(4, MovementType::Out, Quantity::new(4).unwrap()).unwrap(), 0);
    }

    #[test]
    fn stock_out_beyond_balance_is_insufficient() {
        let err = apply_movement(3, MovementType::Out, Quantity::new(5).unwrap()).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(3, 5));
    }

    #[test]
    fn stock_in_overflow_is_rejected() {
        assert!(apply_movement(i64::MAX, MovementType::In, Quantity::new(1).unwrap()).is_err());
    }

    #[test]
    fn quantity_deserializes_through_validation() {
        assert!(serde_json::from_str::<Quantity>("0").is_err());
        assert_eq!(serde_json::from_str::<Quantity>("12").unwrap().get(), 12);
    }
}
