//! Notification collaborator
//!
//! Delivery (email, SMS) lives outside this core. Checkout fires an order
//! confirmation at this seam and moves on: a failed notification is logged by
//! the caller, never rolled into the checkout transaction.

use async_trait::async_trait;
use folio_core::order::Order;
use mockall::automock;
use thiserror::Error;

/// Failure to hand a notification to the delivery collaborator.
#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound notification seam.
#[automock]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an order confirmation for a freshly created order.
    async fn order_confirmation(&self, order: &Order) -> Result<(), NotifyError>;
}

/// A notifier that delivers nothing, for tests and wiring without a delivery
/// collaborator.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn order_confirmation(&self, _order: &Order) -> Result<(), NotifyError> {
        Ok(())
    }
}
