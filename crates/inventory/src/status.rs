//! Stock status labels derived from a balance and its thresholds.

use core::fmt;

use serde::{Serialize, Serializer};

/// Stock status, derived at read time from the balance and thresholds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum StockStatus {
    LowStock,
    InStock,
    OverStock,
}

impl StockStatus {
    /// `stock < min` is low, `stock > max` is over, anything else is in stock.
    pub fn derive(stock: i64, min_stock: i64, max_stock: i64) -> Self {
        if stock < min_stock {
            StockStatus::LowStock
        } else if stock > max_stock {
            StockStatus::OverStock
        } else {
            StockStatus::InStock
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            StockStatus::LowStock => "Low Stock",
            StockStatus::InStock => "In Stock",
            StockStatus::OverStock => "OverStock",
        }
    }

    /// Whether the product needs a restock or a sell-down.
    pub fn needs_attention(self) -> bool {
        self != StockStatus::InStock
    }
}

impl fmt::Display for StockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for StockStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_min_is_low() {
        assert_eq!(StockStatus::derive(2, 5, 50), StockStatus::LowStock);
        assert_eq!(StockStatus::derive(2, 5, 50).to_string(), "Low Stock");
    }

    #[test]
    fn above_max_is_over() {
        assert_eq!(StockStatus::derive(80, 5, 50).label(), "OverStock");
    }

    #[test]
    fn bounds_are_inclusive_in_stock() {
        assert_eq!(StockStatus::derive(5, 5, 50), StockStatus::InStock);
        assert_eq!(StockStatus::derive(50, 5, 50), StockStatus::InStock);
        assert!(!StockStatus::derive(20, 5, 50).needs_attention());
    }
}
