//! Order lifecycle service
//!
//! Customer-facing operations are scoped to the owning user; fulfilment
//! operations (processing) are internal and unscoped. Guard failures come
//! back as `Ok(false)`: the order was left untouched and the caller reports a
//! user-facing message.

use std::sync::Arc;

use folio_core::ids::{OrderId, UserId};
use folio_core::order::Order;
use jiff::Timestamp;
use tracing::{info, warn};

use crate::store::{CommerceStore, StoreError};

/// Put every order item's quantity back onto its book's stock. Individual
/// restores are retried once; a second failure propagates so the caller can
/// surface the inconsistency instead of dropping it.
pub(crate) async fn restore_order_stock(
    store: &dyn CommerceStore,
    order_id: OrderId,
) -> Result<(), StoreError> {
    let items = store.order_items(order_id).await?;

    for item in &items {
        if let Err(error) = store.restore_stock(item.book_id, item.quantity).await {
            warn!(%order_id, book_id = %item.book_id, %error, "stock restore failed, retrying");
            store.restore_stock(item.book_id, item.quantity).await?;
        }
    }

    Ok(())
}

/// Order lifecycle operations.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn CommerceStore>,
}

impl OrderService {
    /// Build the service over a store.
    #[must_use]
    pub fn new(store: Arc<dyn CommerceStore>) -> Self {
        Self { store }
    }

    /// Fetch an order for its owner.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown orders and for orders
    /// owned by someone else.
    pub async fn find(&self, user_id: UserId, order_id: OrderId) -> Result<Order, StoreError> {
        self.store.order_for_user(user_id, order_id).await
    }

    /// Move an order to processing (internal fulfilment operation). Returns
    /// `false` when the order is past the point of processing.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store fails.
    pub async fn mark_as_processing(
        &self,
        order_id: OrderId,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut order = self.store.order(order_id).await?;

        if !order.mark_as_processing(now) {
            return Ok(false);
        }

        self.store.save_order(&order).await?;

        Ok(true)
    }

    /// Cancel an order on the owner's behalf, restoring stock for every
    /// item. Returns `false` when the order can no longer be cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown or foreign orders, or any
    /// other [`StoreError`] when the store fails.
    pub async fn cancel(
        &self,
        user_id: UserId,
        order_id: OrderId,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut order = self.store.order_for_user(user_id, order_id).await?;

        if !order.cancel(reason, now) {
            return Ok(false);
        }

        self.store.save_order(&order).await?;
        restore_order_stock(self.store.as_ref(), order_id).await?;

        info!(order_number = order.order_number(), "order cancelled, stock restored");

        Ok(true)
    }
}
