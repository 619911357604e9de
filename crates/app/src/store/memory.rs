//! In-memory commerce store
//!
//! A complete [`CommerceStore`] over hash maps behind a mutex. Used by the
//! test suites and by demo wiring; `commit_checkout` mirrors the Postgres
//! store's all-or-nothing contract by checking every stock decrement before
//! applying any of them.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use folio_core::{
    cart::Cart,
    catalog::Book,
    ids::{BookId, CartId, OrderId, PaymentId, UserId},
    order::{Order, OrderItem},
    payment::Payment,
    shipment::Shipment,
};
use rustc_hash::FxHashMap;

use super::{CommerceStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    books: FxHashMap<BookId, Book>,
    carts: FxHashMap<UserId, Cart>,
    orders: FxHashMap<OrderId, Order>,
    order_items: FxHashMap<OrderId, Vec<OrderItem>>,
    payments: FxHashMap<PaymentId, Payment>,
    shipments: FxHashMap<OrderId, Shipment>,
}

/// Thread-safe in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Backend`] if the store's lock is poisoned.
    pub fn put_book(&self, book: Book) -> Result<(), StoreError> {
        self.inner()?.books.insert(book.id, book);

        Ok(())
    }

    fn inner(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl CommerceStore for MemoryStore {
    async fn book(&self, id: BookId) -> Result<Book, StoreError> {
        self.inner()?.books.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn books(&self, ids: &[BookId]) -> Result<FxHashMap<BookId, Book>, StoreError> {
        let inner = self.inner()?;

        Ok(ids
            .iter()
            .filter_map(|id| inner.books.get(id).map(|book| (*id, book.clone())))
            .collect())
    }

    async fn restore_stock(&self, book_id: BookId, quantity: u32) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        let book = inner.books.get_mut(&book_id).ok_or(StoreError::NotFound)?;
        book.stock_quantity += quantity;

        Ok(())
    }

    async fn active_cart(&self, user_id: UserId) -> Result<Cart, StoreError> {
        Ok(self
            .inner()?
            .carts
            .entry(user_id)
            .or_insert_with(|| Cart::new(user_id, None))
            .clone())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        self.inner()?.carts.insert(cart.user_id(), cart.clone());

        Ok(())
    }

    async fn commit_checkout(
        &self,
        order: &Order,
        items: &[OrderItem],
        cart_id: CartId,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner()?;

        if inner
            .orders
            .values()
            .any(|existing| existing.order_number() == order.order_number())
        {
            return Err(StoreError::Conflict);
        }

        // Validate every decrement before touching anything, so a failure
        // leaves the store exactly as it was.
        for item in items {
            let book = inner
                .books
                .get(&item.book_id)
                .ok_or(StoreError::InsufficientStock(item.book_id))?;

            if book.stock_quantity < item.quantity {
                return Err(StoreError::InsufficientStock(item.book_id));
            }
        }

        for item in items {
            if let Some(book) = inner.books.get_mut(&item.book_id) {
                book.stock_quantity -= item.quantity;
            }
        }

        let items = items
            .iter()
            .map(|item| {
                let mut item = item.clone();
                item.normalise();
                item
            })
            .collect();

        inner.orders.insert(order.id(), order.clone());
        inner.order_items.insert(order.id(), items);
        inner.carts.retain(|_, cart| cart.id() != cart_id);

        Ok(())
    }

    async fn order_for_user(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Order, StoreError> {
        let inner = self.inner()?;
        let order = inner.orders.get(&order_id).ok_or(StoreError::NotFound)?;

        if order.user_id() != user_id {
            return Err(StoreError::NotFound);
        }

        Ok(order.clone())
    }

    async fn order(&self, order_id: OrderId) -> Result<Order, StoreError> {
        self.inner()?
            .orders
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        self.inner()?
            .order_items
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        if !inner.orders.contains_key(&order.id()) {
            return Err(StoreError::NotFound);
        }
        inner.orders.insert(order.id(), order.clone());

        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        self.inner()?.payments.insert(payment.id(), payment.clone());

        Ok(())
    }

    async fn save_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        if !inner.payments.contains_key(&payment.id()) {
            return Err(StoreError::NotFound);
        }
        inner.payments.insert(payment.id(), payment.clone());

        Ok(())
    }

    async fn payment(&self, id: PaymentId) -> Result<Payment, StoreError> {
        self.inner()?
            .payments
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Payment, StoreError> {
        self.inner()?
            .payments
            .values()
            .filter(|payment| payment.order_id() == order_id)
            .max_by_key(|payment| (payment.parts().created_at, payment.id()))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Payment, StoreError> {
        self.inner()?
            .payments
            .values()
            .find(|payment| payment.transaction_id() == Some(transaction_id))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn insert_shipment(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let mut inner = self.inner()?;

        let duplicate = inner.shipments.contains_key(&shipment.order_id())
            || inner
                .shipments
                .values()
                .any(|existing| existing.tracking_number() == shipment.tracking_number());
        if duplicate {
            return Err(StoreError::Conflict);
        }

        inner.shipments.insert(shipment.order_id(), shipment.clone());

        Ok(())
    }

    async fn save_shipment(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let mut inner = self.inner()?;
        if !inner.shipments.contains_key(&shipment.order_id()) {
            return Err(StoreError::NotFound);
        }
        inner.shipments.insert(shipment.order_id(), shipment.clone());

        Ok(())
    }

    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Shipment, StoreError> {
        self.inner()?
            .shipments
            .get(&order_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use rust_decimal::Decimal;
    use rustc_hash::FxHashMap;
    use testresult::TestResult;

    use folio_core::{address::ShippingAddress, order::build_order};

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

    fn checkout_fixture(
        store: &MemoryStore,
        book: &Book,
        quantity: u32,
        order_number: &str,
    ) -> TestResult<(Order, Vec<OrderItem>, CartId)> {
        store.put_book(book.clone())?;

        let mut cart = Cart::new(UserId::new(), None);
        assert!(cart.add_book(book, quantity), "fixture add must succeed");

        let mut books = FxHashMap::default();
        books.insert(book.id, book.clone());

        let (order, items) = build_order(
            &cart,
            &books,
            address(),
            None,
            order_number.to_string(),
            now(),
        )?;

        Ok((order, items, cart.id()))
    }

    #[tokio::test]
    async fn active_cart_is_created_lazily_and_persists() -> TestResult {
        let store = MemoryStore::new();
        let user = UserId::new();

        let cart = store.active_cart(user).await?;
        let again = store.active_cart(user).await?;

        assert_eq!(cart.id(), again.id(), "same cart on repeat access");

        Ok(())
    }

    #[tokio::test]
    async fn commit_checkout_decrements_stock_and_clears_cart() -> TestResult {
        let store = MemoryStore::new();
        let book = book("Kim", 100, 5);
        let (order, items, cart_id) = checkout_fixture(&store, &book, 2, "ORD197001010001")?;
        store.save_cart(&Cart::from_parts(cart_id, order.user_id(), vec![], None)).await?;

        store.commit_checkout(&order, &items, cart_id).await?;

        assert_eq!(store.book(book.id).await?.stock_quantity, 3);
        assert_eq!(store.order(order.id()).await?.order_number(), order.order_number());
        let fresh = store.active_cart(order.user_id()).await?;
        assert_ne!(fresh.id(), cart_id, "checked-out cart is gone");

        Ok(())
    }

    #[tokio::test]
    async fn commit_checkout_is_all_or_nothing_on_stock() -> TestResult {
        let store = MemoryStore::new();
        let plentiful = book("Kim", 100, 5);
        let scarce = book("Emma", 100, 1);
        store.put_book(plentiful.clone())?;
        store.put_book(scarce.clone())?;

        let mut cart = Cart::new(UserId::new(), None);
        assert!(cart.add_book(&plentiful, 2), "fixture add");
        assert!(cart.add_book(&scarce, 1), "fixture add");
        let mut books = FxHashMap::default();
        books.insert(plentiful.id, plentiful.clone());
        books.insert(scarce.id, scarce.clone());
        let (order, items) = build_order(
            &cart,
            &books,
            address(),
            None,
            "ORD197001010002".to_string(),
            now(),
        )?;

        // Someone else bought the scarce book between validation and commit.
        {
            let mut drained = scarce.clone();
            drained.stock_quantity = 0;
            store.put_book(drained)?;
        }

        let result = store.commit_checkout(&order, &items, cart.id()).await;

        assert!(
            matches!(result, Err(StoreError::InsufficientStock(id)) if id == scarce.id),
            "expected insufficient stock, got {result:?}"
        );
        assert_eq!(
            store.book(plentiful.id).await?.stock_quantity,
            5,
            "no partial decrement may persist"
        );
        assert!(store.order(order.id()).await.is_err(), "no order row may persist");

        Ok(())
    }

    #[tokio::test]
    async fn commit_checkout_rejects_duplicate_order_numbers() -> TestResult {
        let store = MemoryStore::new();
        let book = book("Kim", 100, 10);
        let (order, items, cart_id) = checkout_fixture(&store, &book, 1, "ORD197001010003")?;
        store.commit_checkout(&order, &items, cart_id).await?;

        let (clash, clash_items, clash_cart) =
            checkout_fixture(&store, &book, 1, "ORD197001010003")?;
        let result = store.commit_checkout(&clash, &clash_items, clash_cart).await;

        assert!(matches!(result, Err(StoreError::Conflict)), "got {result:?}");

        Ok(())
    }

    #[tokio::test]
    async fn order_lookup_is_scoped_to_the_owner() -> TestResult {
        let store = MemoryStore::new();
        let book = book("Kim", 100, 10);
        let (order, items, cart_id) = checkout_fixture(&store, &book, 1, "ORD197001010004")?;
        store.commit_checkout(&order, &items, cart_id).await?;

        let result = store.order_for_user(UserId::new(), order.id()).await;

        assert!(
            matches!(result, Err(StoreError::NotFound)),
            "another user's order must look nonexistent, got {result:?}"
        );

        Ok(())
    }

    #[tokio::test]
    async fn shipment_insert_rejects_duplicate_tracking() -> TestResult {
        let store = MemoryStore::new();
        let first = Shipment::new(OrderId::new(), "TRK1970010100001".to_string(), None, now());
        let clash = Shipment::new(OrderId::new(), "TRK1970010100001".to_string(), None, now());
        store.insert_shipment(&first).await?;

        let result = store.insert_shipment(&clash).await;

        assert!(matches!(result, Err(StoreError::Conflict)), "got {result:?}");

        Ok(())
    }
}
