//! Checkout
//!
//! Turns the user's active cart into an order: validate against live stock,
//! snapshot the order, commit everything atomically, then fire the
//! confirmation notification. Order numbers are generated optimistically and
//! regenerated when the store reports a unique-constraint conflict.

use std::sync::Arc;

use folio_core::{
    address::ShippingAddress,
    ids::{BookId, UserId},
    numbers,
    order::{Order, OrderBuildError, build_order},
};
use jiff::Timestamp;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    notify::Notifier,
    store::{CommerceStore, StoreError},
};

/// Order-number regeneration attempts before giving up.
const MAX_ORDER_NUMBER_ATTEMPTS: u32 = 5;

/// Failures of the checkout flow.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The cart failed validation; nothing was mutated. The messages are
    /// user-facing.
    #[error("cart cannot be checked out: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Stock for a book ran out between validation and commit. The entire
    /// transaction was rolled back; nothing partial persists.
    #[error("stock ran out during checkout for book {0}")]
    OutOfStock(BookId),

    /// Every generated order number collided. Effectively unreachable with a
    /// four-digit suffix, but the retry loop is bounded.
    #[error("could not allocate a unique order number")]
    OrderNumberExhausted,

    /// The store failed; nothing partial persists.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The checkout orchestrator.
#[derive(Clone)]
pub struct CheckoutService {
    store: Arc<dyn CommerceStore>,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutService {
    /// Build the service over a store and a notification collaborator.
    #[must_use]
    pub fn new(store: Arc<dyn CommerceStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Create an order from the user's active cart.
    ///
    /// The whole step is atomic in the store: order header, item snapshots,
    /// conditional stock decrements and the cart clear either all persist or
    /// none do. The confirmation notification is fire-and-forget; its failure
    /// is logged and never rolls back the order.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::Validation`] when the cart cannot be checked
    /// out, [`CheckoutError::OutOfStock`] when a decrement loses the race for
    /// the last copies, and [`CheckoutError::Store`] for backend failures.
    pub async fn checkout(
        &self,
        user_id: UserId,
        shipping_address: ShippingAddress,
        notes: Option<String>,
        now: Timestamp,
    ) -> Result<Order, CheckoutError> {
        let cart = self.store.active_cart(user_id).await?;

        let book_ids: Vec<BookId> = cart.items().iter().map(|item| item.book_id).collect();
        let books = self.store.books(&book_ids).await?;

        for _ in 0..MAX_ORDER_NUMBER_ATTEMPTS {
            let order_number = {
                let mut rng = rand::thread_rng();
                numbers::order_number(now, &mut rng)
            };

            let (order, items) = build_order(
                &cart,
                &books,
                shipping_address.clone(),
                notes.clone(),
                order_number,
                now,
            )
            .map_err(|error| match error {
                OrderBuildError::Validation(problems) => CheckoutError::Validation(problems),
            })?;

            match self.store.commit_checkout(&order, &items, cart.id()).await {
                Ok(()) => {
                    info!(
                        order_number = order.order_number(),
                        total = %order.total_amount(),
                        "order created"
                    );

                    if let Err(error) = self.notifier.order_confirmation(&order).await {
                        warn!(
                            order_number = order.order_number(),
                            %error,
                            "order confirmation notification failed"
                        );
                    }

                    return Ok(order);
                }
                // Another checkout claimed the same candidate number first;
                // regenerate and retry.
                Err(StoreError::Conflict) => continue,
                Err(StoreError::InsufficientStock(book_id)) => {
                    return Err(CheckoutError::OutOfStock(book_id));
                }
                Err(other) => return Err(other.into()),
            }
        }

        Err(CheckoutError::OrderNumberExhausted)
    }
}

#[cfg(test)]
mod tests {
    use folio_core::{cart::Cart, catalog::Book};
    use mockall::predicate::always;
    use rust_decimal::Decimal;
    use rustc_hash::FxHashMap;
    use testresult::TestResult;

    use crate::{notify::NoopNotifier, store::MockCommerceStore};

    use super::*;

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

    #[tokio::test]
    async fn retries_order_number_on_conflict() -> TestResult {
        let user_id = UserId::new();
        let book = Book {
            id: BookId::new(),
            title: "Kim".to_string(),
            price: Decimal::from(100),
            stock_quantity: 10,
            is_active: true,
        };

        let mut cart = Cart::new(user_id, None);
        assert!(cart.add_book(&book, 1), "fixture add must succeed");

        let mut store = MockCommerceStore::new();
        {
            let cart = cart.clone();
            store
                .expect_active_cart()
                .returning(move |_| Ok(cart.clone()));
        }
        {
            let book = book.clone();
            store.expect_books().returning(move |_| {
                let mut books = FxHashMap::default();
                books.insert(book.id, book.clone());
                Ok(books)
            });
        }
        // First candidate collides, second lands.
        let mut attempts = 0;
        store
            .expect_commit_checkout()
            .with(always(), always(), always())
            .returning(move |_, _, _| {
                attempts += 1;
                if attempts == 1 {
                    Err(StoreError::Conflict)
                } else {
                    Ok(())
                }
            });

        let service = CheckoutService::new(Arc::new(store), Arc::new(NoopNotifier));
        let order = service.checkout(user_id, address(), None, now()).await?;

        assert_eq!(order.user_id(), user_id);

        Ok(())
    }

    #[tokio::test]
    async fn validation_failure_never_reaches_the_store() -> TestResult {
        let user_id = UserId::new();

        let mut store = MockCommerceStore::new();
        store
            .expect_active_cart()
            .returning(move |user_id| Ok(Cart::new(user_id, None)));
        store
            .expect_books()
            .returning(|_| Ok(FxHashMap::default()));
        store.expect_commit_checkout().never();

        let service = CheckoutService::new(Arc::new(store), Arc::new(NoopNotifier));
        let result = service.checkout(user_id, address(), None, now()).await;

        match result {
            Err(CheckoutError::Validation(problems)) => {
                assert_eq!(problems, vec!["Your cart is empty".to_string()]);
            }
            other => panic!("expected validation failure, got {other:?}"),
        }

        Ok(())
    }
}
