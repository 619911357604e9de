//! Commerce store contract
//!
//! Everything the services need from persistence, behind one async trait so
//! orchestration logic can run against Postgres, the in-memory store, or a
//! [`mockall`] mock. Ownership scoping happens here: a lookup for another
//! user's resource answers [`StoreError::NotFound`], never a hint that the
//! resource exists.

use async_trait::async_trait;
use folio_core::{
    cart::Cart,
    catalog::Book,
    ids::{BookId, CartId, OrderId, PaymentId, UserId},
    order::{Order, OrderItem},
    payment::Payment,
    shipment::Shipment,
};
use mockall::automock;
use rustc_hash::FxHashMap;
use thiserror::Error;

pub mod memory;
pub mod pg;

/// Failures surfaced by a [`CommerceStore`] implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The resource does not exist, or belongs to someone else.
    #[error("resource not found")]
    NotFound,

    /// A unique reference (order number, tracking number) collided; the
    /// caller should regenerate and retry.
    #[error("unique reference conflict")]
    Conflict,

    /// A conditional stock decrement found less stock than required. The
    /// enclosing transaction has been rolled back in full.
    #[error("insufficient stock for book {0}")]
    InsufficientStock(BookId),

    /// The backend itself failed; nothing partial has persisted.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Persistence seam for the commerce services.
#[automock]
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Fetch one book.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown book, or
    /// [`StoreError::Backend`] when the store fails.
    async fn book(&self, id: BookId) -> Result<Book, StoreError>;

    /// Fetch several books at once, keyed by id. Unknown ids are simply
    /// absent from the map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the store fails.
    async fn books(&self, ids: &[BookId]) -> Result<FxHashMap<BookId, Book>, StoreError>;

    /// Unconditionally add stock back to a book, used when cancelling or
    /// refunding an order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown book, or
    /// [`StoreError::Backend`] when the store fails.
    async fn restore_stock(&self, book_id: BookId, quantity: u32) -> Result<(), StoreError>;

    /// The user's active cart, created empty on first use.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the store fails.
    async fn active_cart(&self, user_id: UserId) -> Result<Cart, StoreError>;

    /// Persist a cart and its items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the store fails.
    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError>;

    /// Commit a checkout atomically: insert the order header and items,
    /// conditionally decrement stock for every item, and clear the cart.
    /// All-or-nothing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a duplicate order number,
    /// [`StoreError::InsufficientStock`] when any decrement would go below
    /// zero, or [`StoreError::Backend`] when the store fails. Nothing partial
    /// persists on any error.
    async fn commit_checkout(
        &self,
        order: &Order,
        items: &[OrderItem],
        cart_id: CartId,
    ) -> Result<(), StoreError>;

    /// Fetch an order by id, scoped to its owner.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown orders and for orders
    /// owned by someone else, or [`StoreError::Backend`] when the store
    /// fails.
    async fn order_for_user(&self, user_id: UserId, order_id: OrderId)
    -> Result<Order, StoreError>;

    /// Fetch an order by id without ownership scoping. Internal use only
    /// (webhook cascades); never expose this path to user input.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown order, or
    /// [`StoreError::Backend`] when the store fails.
    async fn order(&self, order_id: OrderId) -> Result<Order, StoreError>;

    /// The item snapshots belonging to an order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown order, or
    /// [`StoreError::Backend`] when the store fails.
    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    /// Persist an order's mutable state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown order, or
    /// [`StoreError::Backend`] when the store fails.
    async fn save_order(&self, order: &Order) -> Result<(), StoreError>;

    /// Insert a fresh payment attempt.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] when the store fails.
    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Persist a payment's mutable state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown payment, or
    /// [`StoreError::Backend`] when the store fails.
    async fn save_payment(&self, payment: &Payment) -> Result<(), StoreError>;

    /// Fetch a payment by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown payment, or
    /// [`StoreError::Backend`] when the store fails.
    async fn payment(&self, id: PaymentId) -> Result<Payment, StoreError>;

    /// The most recent payment attempt for an order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the order has no payments, or
    /// [`StoreError::Backend`] when the store fails.
    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Payment, StoreError>;

    /// Fetch a payment by its processor transaction reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown reference, or
    /// [`StoreError::Backend`] when the store fails.
    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Payment, StoreError>;

    /// Insert a shipment.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] on a duplicate tracking number or an
    /// order that already has a shipment, or [`StoreError::Backend`] when the
    /// store fails.
    async fn insert_shipment(&self, shipment: &Shipment) -> Result<(), StoreError>;

    /// Persist a shipment's mutable state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown shipment, or
    /// [`StoreError::Backend`] when the store fails.
    async fn save_shipment(&self, shipment: &Shipment) -> Result<(), StoreError>;

    /// The shipment fulfilling an order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the order has no shipment, or
    /// [`StoreError::Backend`] when the store fails.
    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Shipment, StoreError>;
}
