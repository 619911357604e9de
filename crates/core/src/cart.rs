//! Cart
//!
//! A cart is a user's pending, unconfirmed collection of book selections with
//! snapshotted unit prices. It owns its items exclusively (unique per book),
//! keeps the snapshotted price synced to the live catalog price on every
//! mutation, and validates itself against live stock before checkout.

use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    catalog::Book,
    ids::{BookId, CartId, UserId},
};

/// Subtotal at or above which shipping is free, in currency units.
pub const FREE_SHIPPING_THRESHOLD: u32 = 500;

/// Flat shipping fee below the free-shipping threshold, in currency units.
pub const FLAT_SHIPPING_FEE: u32 = 50;

/// A single book line in a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    /// The book this line refers to.
    pub book_id: BookId,

    /// Number of copies, always at least 1 while the line exists.
    pub quantity: u32,

    /// Unit price snapshot, refreshed to the live catalog price whenever the
    /// line is touched.
    pub unit_price: Decimal,
}

impl CartItem {
    /// Price of the whole line.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// A user's active cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    user_id: UserId,
    items: Vec<CartItem>,
    expires_at: Option<Timestamp>,
}

impl Cart {
    /// Create an empty cart for a user.
    #[must_use]
    pub fn new(user_id: UserId, expires_at: Option<Timestamp>) -> Self {
        Self {
            id: CartId::new(),
            user_id,
            items: Vec::new(),
            expires_at,
        }
    }

    /// Reassemble a cart from stored parts.
    #[must_use]
    pub fn from_parts(
        id: CartId,
        user_id: UserId,
        items: Vec<CartItem>,
        expires_at: Option<Timestamp>,
    ) -> Self {
        Self {
            id,
            user_id,
            items,
            expires_at,
        }
    }

    /// Cart identifier.
    #[must_use]
    pub fn id(&self) -> CartId {
        self.id
    }

    /// Owning user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The cart's lines, unique per book, in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// When the cart stops being usable, if a time-to-live was set.
    #[must_use]
    pub fn expires_at(&self) -> Option<Timestamp> {
        self.expires_at
    }

    /// Whether the cart's time-to-live has elapsed. Expiry is checked lazily;
    /// sweeping expired carts is an external job.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Sum of line quantities, saturating rather than overflowing.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.items
            .iter()
            .fold(0_u32, |total, item| total.saturating_add(item.quantity))
    }

    /// Sum of line totals at the snapshotted unit prices.
    #[must_use]
    pub fn total_amount(&self) -> Decimal {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Add copies of a book, merging into an existing line for the same book.
    ///
    /// Returns `false` without changing the cart when the book is inactive,
    /// when `quantity` is zero, or when the merged quantity would exceed live
    /// stock (or overflow entirely). On success the line's unit price is
    /// refreshed to the book's current price.
    pub fn add_book(&mut self, book: &Book, quantity: u32) -> bool {
        if quantity == 0 || !book.is_active {
            return false;
        }

        let existing = self
            .items
            .iter_mut()
            .find(|item| item.book_id == book.id);

        let Some(merged) =
            quantity.checked_add(existing.as_ref().map_or(0, |item| item.quantity))
        else {
            return false;
        };
        if merged > book.stock_quantity {
            return false;
        }

        match existing {
            Some(item) => {
                item.quantity = merged;
                item.unit_price = book.price;
            }
            None => self.items.push(CartItem {
                book_id: book.id,
                quantity,
                unit_price: book.price,
            }),
        }

        true
    }

    /// Set the quantity of a book's line outright.
    ///
    /// A quantity of zero removes the line. Otherwise the new quantity is
    /// validated against live stock and the unit price refreshed; returns
    /// `false` without changing the cart when validation fails.
    pub fn update_quantity(&mut self, book: &Book, quantity: u32) -> bool {
        if quantity == 0 {
            return self.remove_book(book.id);
        }

        if !book.has_stock_for(quantity) {
            return false;
        }

        match self.items.iter_mut().find(|item| item.book_id == book.id) {
            Some(item) => {
                item.quantity = quantity;
                item.unit_price = book.price;
                true
            }
            None => false,
        }
    }

    /// Remove a book's line entirely. Returns `false` if no such line exists.
    pub fn remove_book(&mut self, book_id: BookId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.book_id != book_id);

        self.items.len() < before
    }

    /// Drop every line.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Check the cart against live catalog state ahead of checkout.
    ///
    /// Returns human-readable problems; checkout is blocked while this list
    /// is non-empty. Covers the empty cart, cart expiry, items that are no
    /// longer available (unknown to the catalog, inactive, or out of stock)
    /// and items whose requested quantity exceeds remaining stock.
    #[must_use]
    pub fn validate_for_checkout(
        &self,
        books: &FxHashMap<BookId, Book>,
        now: Timestamp,
    ) -> Vec<String> {
        let mut problems = Vec::new();

        if self.is_empty() {
            problems.push("Your cart is empty".to_string());
            return problems;
        }

        if self.is_expired(now) {
            problems.push("Your cart has expired, please rebuild it".to_string());
        }

        let mut unavailable = Vec::new();
        let mut short_stocked = Vec::new();

        for item in &self.items {
            match books.get(&item.book_id) {
                None => unavailable.push(item.book_id.to_string()),
                Some(book) if !book.is_available() => unavailable.push(book.title.clone()),
                Some(book) if book.stock_quantity < item.quantity => short_stocked.push(format!(
                    "{} (requested {}, available {})",
                    book.title, item.quantity, book.stock_quantity
                )),
                Some(_) => {}
            }
        }

        if !unavailable.is_empty() {
            problems.push(format!(
                "Some items are no longer available: {}",
                unavailable.join(", ")
            ));
        }

        if !short_stocked.is_empty() {
            problems.push(format!(
                "Insufficient stock for: {}",
                short_stocked.join(", ")
            ));
        }

        problems
    }

    /// Flat-rate shipping estimate: free at or above
    /// [`FREE_SHIPPING_THRESHOLD`], otherwise [`FLAT_SHIPPING_FEE`].
    #[must_use]
    pub fn estimated_shipping(&self) -> Decimal {
        if self.total_amount() >= Decimal::from(FREE_SHIPPING_THRESHOLD) {
            Decimal::ZERO
        } else {
            Decimal::from(FLAT_SHIPPING_FEE)
        }
    }
}
