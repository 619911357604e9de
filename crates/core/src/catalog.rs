//! Catalog collaborator view
//!
//! The catalog itself (categories, search, CSV import) is an external
//! collaborator; the commerce core only needs this read view of a book plus
//! the store-level conditional stock adjustments.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ids::BookId;

/// A book as the commerce core sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Catalog identifier.
    pub id: BookId,

    /// Title, snapshotted onto order items at checkout.
    pub title: String,

    /// Current unit price.
    pub price: Decimal,

    /// Live stock level. Decremented at checkout, restored on cancellation.
    pub stock_quantity: u32,

    /// Inactive books cannot be added to a cart or checked out.
    pub is_active: bool,
}

impl Book {
    /// Whether the book can currently be purchased at all.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.is_active && self.stock_quantity > 0
    }

    /// Whether `quantity` units can currently be purchased.
    #[must_use]
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.is_active && self.stock_quantity >= quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(stock: u32, active: bool) -> Book {
        Book {
            id: BookId::new(),
            title: "The Moonstone".to_string(),
            price: Decimal::from(250),
            stock_quantity: stock,
            is_active: active,
        }
    }

    #[test]
    fn availability_requires_active_and_stocked() {
        assert!(book(1, true).is_available());
        assert!(!book(0, true).is_available());
        assert!(!book(1, false).is_available());
    }

    #[test]
    fn has_stock_for_compares_against_live_stock() {
        let b = book(3, true);

        assert!(b.has_stock_for(3));
        assert!(!b.has_stock_for(4));
    }
}
