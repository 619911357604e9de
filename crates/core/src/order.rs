//! Orders
//!
//! An order is the immutable unit of fulfilment and payment, created
//! transactionally from a validated cart. Item titles and prices are
//! snapshotted at creation so later catalog edits never rewrite history.
//! Status moves through a guarded state machine; every guard returns `false`
//! and leaves the order untouched when the transition is illegal.

use std::str::FromStr;

use jiff::{Timestamp, ToSpan};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    address::ShippingAddress,
    cart::Cart,
    catalog::Book,
    ids::{BookId, OrderId, UserId},
};

/// Hours after shipping within which delivery is estimated.
const DELIVERY_AFTER_SHIP_HOURS: i64 = 3 * 24;

/// Hours after creation within which delivery is estimated for orders that
/// have not shipped yet.
const DELIVERY_AFTER_CREATE_HOURS: i64 = 7 * 24;

/// Lifecycle state of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting payment.
    Pending,

    /// Payment completed.
    Confirmed,

    /// Being picked and packed.
    Processing,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer.
    Delivered,

    /// Cancelled before fulfilment; stock has been restored.
    Cancelled,
}

impl OrderStatus {
    /// Stable storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A status string read back from storage was not recognised.
#[derive(Debug, Error)]
#[error("unrecognised order status {0:?}")]
pub struct ParseOrderStatusError(String);

impl FromStr for OrderStatus {
    type Err = ParseOrderStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(ParseOrderStatusError(other.to_string())),
        }
    }
}

/// Errors raised while building an order from a cart.
#[derive(Debug, Error)]
pub enum OrderBuildError {
    /// The cart failed checkout validation; the problems are the
    /// human-readable messages from the cart.
    #[error("cart cannot be checked out: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// An immutable snapshot of one cart line at order time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Owning order.
    pub order_id: OrderId,

    /// The book ordered; the live catalog row may change after this.
    pub book_id: BookId,

    /// Title at order time.
    pub book_title: String,

    /// Copies ordered.
    pub quantity: u32,

    /// Unit price at order time.
    pub unit_price: Decimal,

    /// Derived line total, `quantity * unit_price`. Recomputed by
    /// [`OrderItem::normalise`] on every save.
    pub total_price: Decimal,
}

impl OrderItem {
    /// Snapshot a line for `order_id`.
    #[must_use]
    pub fn new(order_id: OrderId, book: &Book, quantity: u32, unit_price: Decimal) -> Self {
        let mut item = Self {
            order_id,
            book_id: book.id,
            book_title: book.title.clone(),
            quantity,
            unit_price,
            total_price: Decimal::ZERO,
        };
        item.normalise();

        item
    }

    /// Re-derive `total_price` from quantity and unit price. Stores call this
    /// before persisting so the derived column can never drift.
    pub fn normalise(&mut self) {
        self.total_price = self.unit_price * Decimal::from(self.quantity);
    }
}

/// Stored field set of an order, used to rehydrate [`Order`] from a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderParts {
    /// Order identifier.
    pub id: OrderId,
    /// Owning user.
    pub user_id: UserId,
    /// Globally unique human-facing reference.
    pub order_number: String,
    /// Current lifecycle state.
    pub status: OrderStatus,
    /// Sum of item line totals at order time.
    pub subtotal: Decimal,
    /// Shipping charged at order time.
    pub shipping_cost: Decimal,
    /// `subtotal + shipping_cost`.
    pub total_amount: Decimal,
    /// Frozen destination address.
    pub shipping_address: ShippingAddress,
    /// Free-form notes; cancellations and refunds append here.
    pub notes: Option<String>,
    /// When the order was handed to the carrier.
    pub shipped_at: Option<Timestamp>,
    /// When the order was delivered.
    pub delivered_at: Option<Timestamp>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

/// An order and its guarded state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    parts: OrderParts,
}

impl From<OrderParts> for Order {
    fn from(parts: OrderParts) -> Self {
        Self { parts }
    }
}

impl Order {
    /// Order identifier.
    #[must_use]
    pub fn id(&self) -> OrderId {
        self.parts.id
    }

    /// Owning user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.parts.user_id
    }

    /// Human-facing order reference.
    #[must_use]
    pub fn order_number(&self) -> &str {
        &self.parts.order_number
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> OrderStatus {
        self.parts.status
    }

    /// Sum of item line totals at order time.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.parts.subtotal
    }

    /// Shipping charged at order time.
    #[must_use]
    pub fn shipping_cost(&self) -> Decimal {
        self.parts.shipping_cost
    }

    /// Amount the customer pays.
    #[must_use]
    pub fn total_amount(&self) -> Decimal {
        self.parts.total_amount
    }

    /// Frozen destination address.
    #[must_use]
    pub fn shipping_address(&self) -> &ShippingAddress {
        &self.parts.shipping_address
    }

    /// Free-form notes.
    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.parts.notes.as_deref()
    }

    /// When the order was handed to the carrier, if it has been.
    #[must_use]
    pub fn shipped_at(&self) -> Option<Timestamp> {
        self.parts.shipped_at
    }

    /// When the order was delivered, if it has been.
    #[must_use]
    pub fn delivered_at(&self) -> Option<Timestamp> {
        self.parts.delivered_at
    }

    /// Creation time.
    #[must_use]
    pub fn created_at(&self) -> Timestamp {
        self.parts.created_at
    }

    /// Last mutation time.
    #[must_use]
    pub fn updated_at(&self) -> Timestamp {
        self.parts.updated_at
    }

    /// The stored field set, for persistence.
    #[must_use]
    pub fn parts(&self) -> &OrderParts {
        &self.parts
    }

    /// Whether cancellation is still allowed.
    #[must_use]
    pub fn can_be_cancelled(&self) -> bool {
        matches!(
            self.parts.status,
            OrderStatus::Pending | OrderStatus::Confirmed
        )
    }

    /// Whether the order's contents may still be edited.
    #[must_use]
    pub fn can_be_modified(&self) -> bool {
        self.parts.status == OrderStatus::Pending
    }

    /// Best-effort delivery estimate: three days after shipping once shipped,
    /// seven days after creation while confirmed or processing, otherwise
    /// nothing to estimate.
    #[must_use]
    pub fn estimated_delivery(&self) -> Option<Timestamp> {
        if let Some(shipped_at) = self.parts.shipped_at {
            return Some(shipped_at + DELIVERY_AFTER_SHIP_HOURS.hours());
        }

        match self.parts.status {
            OrderStatus::Confirmed | OrderStatus::Processing => {
                Some(self.parts.created_at + DELIVERY_AFTER_CREATE_HOURS.hours())
            }
            _ => None,
        }
    }

    /// Mark payment as received: pending to confirmed only.
    pub fn confirm(&mut self, now: Timestamp) -> bool {
        if self.parts.status != OrderStatus::Pending {
            return false;
        }

        self.parts.status = OrderStatus::Confirmed;
        self.parts.updated_at = now;

        true
    }

    /// Start picking and packing: pending or confirmed to processing.
    pub fn mark_as_processing(&mut self, now: Timestamp) -> bool {
        if !matches!(
            self.parts.status,
            OrderStatus::Pending | OrderStatus::Confirmed
        ) {
            return false;
        }

        self.parts.status = OrderStatus::Processing;
        self.parts.updated_at = now;

        true
    }

    /// Hand over to the carrier: confirmed or processing to shipped.
    /// `shipped_at` is stamped once and never overwritten.
    pub fn mark_as_shipped(&mut self, now: Timestamp) -> bool {
        if !matches!(
            self.parts.status,
            OrderStatus::Confirmed | OrderStatus::Processing
        ) {
            return false;
        }

        self.parts.status = OrderStatus::Shipped;
        self.parts.shipped_at.get_or_insert(now);
        self.parts.updated_at = now;

        true
    }

    /// Confirm receipt: shipped to delivered. Stamps `delivered_at` once, and
    /// backfills `shipped_at` if it was somehow never recorded.
    pub fn mark_as_delivered(&mut self, now: Timestamp) -> bool {
        if self.parts.status != OrderStatus::Shipped {
            return false;
        }

        self.parts.status = OrderStatus::Delivered;
        self.parts.delivered_at.get_or_insert(now);
        self.parts.shipped_at.get_or_insert(now);
        self.parts.updated_at = now;

        true
    }

    /// Cancel an unfulfilled order: pending or confirmed only. The caller is
    /// responsible for restoring stock for every order item afterwards.
    pub fn cancel(&mut self, reason: Option<&str>, now: Timestamp) -> bool {
        if !self.can_be_cancelled() {
            return false;
        }

        self.parts.status = OrderStatus::Cancelled;
        if let Some(reason) = reason {
            self.append_note(&format!("Cancelled: {reason}"));
        }
        self.parts.updated_at = now;

        true
    }

    /// Append a line to the order's notes.
    pub fn append_note(&mut self, note: &str) {
        match &mut self.parts.notes {
            Some(notes) => {
                notes.push('\n');
                notes.push_str(note);
            }
            None => self.parts.notes = Some(note.to_string()),
        }
    }
}

/// Build an order and its item snapshots from a validated cart.
///
/// Enforces the cart's checkout validation, snapshots titles and prices, and
/// derives `subtotal`, `shipping_cost` and `total_amount`. The caller supplies
/// the generated order number and persists everything atomically together
/// with the stock decrements and the cart clear.
///
/// # Errors
///
/// Returns [`OrderBuildError::Validation`] with the cart's problem list when
/// the cart cannot be checked out.
pub fn build_order(
    cart: &Cart,
    books: &FxHashMap<BookId, Book>,
    shipping_address: ShippingAddress,
    notes: Option<String>,
    order_number: String,
    now: Timestamp,
) -> Result<(Order, Vec<OrderItem>), OrderBuildError> {
    let problems = cart.validate_for_checkout(books, now);
    if !problems.is_empty() {
        return Err(OrderBuildError::Validation(problems));
    }

    let subtotal = cart.total_amount();
    let shipping_cost = cart.estimated_shipping();
    let id = OrderId::new();

    let items = cart
        .items()
        .iter()
        .map(|line| {
            let book = books
                .get(&line.book_id)
                .ok_or_else(|| OrderBuildError::Validation(vec![format!(
                    "Some items are no longer available: {}",
                    line.book_id
                )]))?;

            Ok(OrderItem::new(id, book, line.quantity, line.unit_price))
        })
        .collect::<Result<Vec<_>, OrderBuildError>>()?;

    let order = Order::from(OrderParts {
        id,
        user_id: cart.user_id(),
        order_number,
        status: OrderStatus::Pending,
        subtotal,
        shipping_cost,
        total_amount: subtotal + shipping_cost,
        shipping_address,
        notes,
        shipped_at: None,
        delivered_at: None,
        created_at: now,
        updated_at: now,
    });

    Ok((order, items))
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn book(title: &str, price: u32, stock: u32) -> Book {
        Book {
            id: BookId::new(),
            title: title.to_string(),
            price: Decimal::from(price),
            stock_quantity: stock,
            is_active: true,
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            name: "Asha Rao".to_string(),
            phone: "+91 98765 43210".to_string(),
            address_line_1: "14 Lake View Road".to_string(),
            address_line_2: None,
            city: "Pune".to_string(),
            state: "MH".to_string(),
            postal_code: "411001".to_string(),
            country: "IN".to_string(),
        }
    }

    fn now() -> Timestamp {
        Timestamp::UNIX_EPOCH
    }

    fn built_order(lines: &[(&Book, u32)]) -> (Order, Vec<OrderItem>) {
        let mut cart = Cart::new(UserId::new(), None);
        let mut books = FxHashMap::default();

        for (book, quantity) in lines {
            assert!(cart.add_book(book, *quantity), "fixture add must succeed");
            books.insert(book.id, (*book).clone());
        }

        #[expect(clippy::unwrap_used, reason = "test fixture over a valid cart")]
        let built = build_order(
            &cart,
            &books,
            address(),
            None,
            "ORD197001010042".to_string(),
            now(),
        )
        .unwrap();

        built
    }

    #[test]
    fn build_order_snapshots_totals_and_items() {
        let kim = book("Kim", 100, 10);
        let emma = book("Emma", 250, 10);

        let (order, items) = built_order(&[(&kim, 3), (&emma, 1)]);

        assert_eq!(order.subtotal(), Decimal::from(550));
        assert_eq!(order.shipping_cost(), Decimal::ZERO);
        assert_eq!(order.total_amount(), Decimal::from(550));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].book_title, "Kim");
        assert_eq!(items[0].total_price, Decimal::from(300));
    }

    #[test]
    fn build_order_charges_flat_shipping_under_threshold() {
        let kim = book("Kim", 200, 10);

        let (order, _) = built_order(&[(&kim, 1)]);

        assert_eq!(order.shipping_cost(), Decimal::from(50));
        assert_eq!(order.total_amount(), Decimal::from(250));
    }

    #[test]
    fn build_order_rejects_invalid_cart() {
        let cart = Cart::new(UserId::new(), None);

        let result = build_order(
            &cart,
            &FxHashMap::default(),
            address(),
            None,
            "ORD197001010042".to_string(),
            now(),
        );

        match result {
            Err(OrderBuildError::Validation(problems)) => {
                assert_eq!(problems, vec!["Your cart is empty".to_string()]);
            }
            Ok(_) => panic!("expected validation failure for an empty cart"),
        }
    }

    #[test]
    fn order_item_normalise_rederives_total() {
        let kim = book("Kim", 100, 10);
        let (_, mut items) = built_order(&[(&kim, 2)]);

        // Simulate a direct mutation that bypassed the constructor.
        items[0].quantity = 5;
        items[0].normalise();

        assert_eq!(items[0].total_price, Decimal::from(500));
    }

    #[test]
    fn happy_path_transitions() {
        let kim = book("Kim", 100, 10);
        let (mut order, _) = built_order(&[(&kim, 1)]);

        assert!(order.confirm(now()));
        assert!(order.mark_as_processing(now()));
        assert!(order.mark_as_shipped(now()));
        assert!(order.mark_as_delivered(now()));

        assert_eq!(order.status(), OrderStatus::Delivered);
        assert!(order.shipped_at().is_some());
        assert!(order.delivered_at().is_some());
    }

    #[test]
    fn confirm_is_a_noop_off_pending() -> TestResult {
        let kim = book("Kim", 100, 10);
        let (mut order, _) = built_order(&[(&kim, 1)]);
        assert!(order.confirm(now()));
        assert!(order.mark_as_shipped(now()));

        assert!(!order.confirm(now()));

        assert_eq!(order.status(), OrderStatus::Shipped);

        Ok(())
    }

    #[test]
    fn shipped_at_is_stamped_once() {
        let kim = book("Kim", 100, 10);
        let (mut order, _) = built_order(&[(&kim, 1)]);
        assert!(order.confirm(now()));

        let first = now();
        assert!(order.mark_as_shipped(first));

        // A second attempt is an illegal transition and must not restamp.
        assert!(!order.mark_as_shipped(first + 1.hour()));

        assert_eq!(order.shipped_at(), Some(first));
    }

    #[test]
    fn cancel_only_from_pending_or_confirmed() {
        let kim = book("Kim", 100, 10);
        let (mut order, _) = built_order(&[(&kim, 1)]);

        assert!(order.can_be_cancelled());
        assert!(order.cancel(Some("changed my mind"), now()));
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert!(
            order.notes().is_some_and(|n| n.contains("changed my mind")),
            "reason should be appended to notes"
        );

        let (mut shipped, _) = built_order(&[(&kim, 1)]);
        assert!(shipped.confirm(now()));
        assert!(shipped.mark_as_shipped(now()));
        assert!(!shipped.cancel(None, now()));
        assert_eq!(shipped.status(), OrderStatus::Shipped);
    }

    #[test]
    fn estimated_delivery_tracks_lifecycle() {
        let kim = book("Kim", 100, 10);
        let (mut order, _) = built_order(&[(&kim, 1)]);

        assert_eq!(order.estimated_delivery(), None, "pending orders have no estimate");

        assert!(order.confirm(now()));
        assert_eq!(
            order.estimated_delivery(),
            Some(now() + (7 * 24).hours()),
            "confirmed orders estimate from creation"
        );

        assert!(order.mark_as_shipped(now()));
        assert_eq!(
            order.estimated_delivery(),
            Some(now() + (3 * 24).hours()),
            "shipped orders estimate from shipping"
        );
    }

    #[test]
    fn status_round_trips_through_storage_form() -> TestResult {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>()?, status);
        }

        assert!("paused".parse::<OrderStatus>().is_err());

        Ok(())
    }
}
