//! Payment service
//!
//! Applies payment transitions and their order-side cascades. The cascade is
//! driven by the [`PaymentEvent`] the entity returns: completion confirms the
//! order, refund cancels it and restores stock. Both the user-initiated
//! refund path and the webhook path go through [`PaymentService::refund`], so
//! the cascade exists exactly once.

use std::sync::Arc;

use folio_core::{
    ids::{OrderId, PaymentId, UserId},
    numbers,
    payment::{Payment, PaymentEvent, PaymentMethod, PaymentStatus},
};
use jiff::Timestamp;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::{
    orders::restore_order_stock,
    store::{CommerceStore, StoreError},
};

/// Payment operations and their order cascades.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn CommerceStore>,
}

impl PaymentService {
    /// Build the service over a store.
    #[must_use]
    pub fn new(store: Arc<dyn CommerceStore>) -> Self {
        Self { store }
    }

    /// Open the initial pending payment for an order, on the owner's behalf.
    /// The amount is always the order total.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown or foreign orders, or any
    /// other [`StoreError`] when the store fails.
    pub async fn initiate(
        &self,
        user_id: UserId,
        order_id: OrderId,
        method: PaymentMethod,
        now: Timestamp,
    ) -> Result<Payment, StoreError> {
        let order = self.store.order_for_user(user_id, order_id).await?;

        let payment = Payment::new(order.id(), method, order.total_amount(), now);
        self.store.insert_payment(&payment).await?;

        Ok(payment)
    }

    /// Record capture of a pending payment and confirm its order. When no
    /// transaction reference is known from any source, a fallback one is
    /// generated so the attempt stays traceable. Returns `false` when the
    /// payment was not pending.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store fails.
    pub async fn complete(
        &self,
        payment_id: PaymentId,
        transaction_id: Option<String>,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut payment = self.store.payment(payment_id).await?;

        let transaction_id = transaction_id
            .or_else(|| payment.transaction_id().map(str::to_string))
            .or_else(|| Some(numbers::fallback_transaction_id()));

        let Some(PaymentEvent::Completed) = payment.mark_as_completed(transaction_id, now) else {
            return Ok(false);
        };

        self.store.save_payment(&payment).await?;
        self.confirm_order(payment.order_id(), now).await;

        info!(%payment_id, order_id = %payment.order_id(), "payment completed");

        Ok(true)
    }

    /// Record a declined payment. Returns `false` when the payment was not
    /// pending.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store fails.
    pub async fn fail(
        &self,
        payment_id: PaymentId,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut payment = self.store.payment(payment_id).await?;

        if !payment.mark_as_failed(reason, now) {
            return Ok(false);
        }

        self.store.save_payment(&payment).await?;

        Ok(true)
    }

    /// Refund a completed payment and cascade: the order is cancelled and
    /// stock restored for every order item, even for partial refunds (the
    /// documented reference behavior). Returns `false` when the payment
    /// cannot be refunded or the requested amount exceeds what was paid.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store fails.
    pub async fn refund(
        &self,
        payment_id: PaymentId,
        amount: Option<Decimal>,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut payment = self.store.payment(payment_id).await?;

        let Some(PaymentEvent::Refunded { amount }) = payment.refund(amount, reason, now) else {
            return Ok(false);
        };

        self.store.save_payment(&payment).await?;

        let order_id = payment.order_id();
        let mut order = self.store.order(order_id).await?;
        if order.cancel(Some("payment refunded"), now) {
            self.save_order_with_retry(&order).await?;
            restore_order_stock(self.store.as_ref(), order_id).await?;
        } else {
            // Refund landed after fulfilment began; record it but leave the
            // order where it is.
            warn!(%order_id, status = order.status().as_str(), "refund cascade could not cancel order");
        }

        info!(%payment_id, %order_id, %amount, "payment refunded");

        Ok(true)
    }

    /// Open a fresh pending attempt for an order whose latest payment
    /// failed, on the owner's behalf. The failed attempt stays on record.
    /// Returns `None` when the latest payment is not failed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for unknown or foreign orders, or any
    /// other [`StoreError`] when the store fails.
    pub async fn retry(
        &self,
        user_id: UserId,
        order_id: OrderId,
        now: Timestamp,
    ) -> Result<Option<Payment>, StoreError> {
        let order = self.store.order_for_user(user_id, order_id).await?;
        let latest = self.store.latest_payment_for_order(order.id()).await?;

        if latest.status() != PaymentStatus::Failed {
            return Ok(None);
        }

        let mut fresh = Payment::new(order.id(), latest.method(), latest.amount(), now);
        fresh.append_note(&format!("Retry of payment {}", latest.id()));
        self.store.insert_payment(&fresh).await?;

        info!(%order_id, previous = %latest.id(), fresh = %fresh.id(), "payment retried");

        Ok(Some(fresh))
    }

    /// Confirm the order behind a completed payment. The cascade is retried
    /// once and logged when it still fails, never silently dropped.
    async fn confirm_order(&self, order_id: OrderId, now: Timestamp) {
        let confirm = || async {
            let mut order = self.store.order(order_id).await?;
            if order.confirm(now) {
                self.store.save_order(&order).await?;
            }
            Ok::<_, StoreError>(())
        };

        if let Err(error) = confirm().await {
            warn!(%order_id, %error, "order confirmation cascade failed, retrying");
            if let Err(error) = confirm().await {
                tracing::error!(%order_id, %error, "order confirmation cascade dropped");
            }
        }
    }

    async fn save_order_with_retry(
        &self,
        order: &folio_core::order::Order,
    ) -> Result<(), StoreError> {
        if let Err(error) = self.store.save_order(order).await {
            warn!(order_id = %order.id(), %error, "order save failed, retrying");
            self.store.save_order(order).await?;
        }

        Ok(())
    }
}
