//! Shipment service
//!
//! Creates the one shipment per order with a unique tracking number and
//! applies shipment transitions together with their order cascades, driven by
//! the [`ShipmentEvent`] the entity returns.

use std::sync::Arc;

use folio_core::{
    ids::OrderId,
    numbers,
    shipment::{Shipment, ShipmentEvent},
};
use jiff::Timestamp;
use tracing::{info, warn};

use crate::store::{CommerceStore, StoreError};

/// Tracking-number regeneration attempts before giving up.
const MAX_TRACKING_NUMBER_ATTEMPTS: u32 = 5;

/// Shipment operations and their order cascades.
#[derive(Clone)]
pub struct ShipmentService {
    store: Arc<dyn CommerceStore>,
}

impl ShipmentService {
    /// Build the service over a store.
    #[must_use]
    pub fn new(store: Arc<dyn CommerceStore>) -> Self {
        Self { store }
    }

    /// Open a shipment for an order in the preparing state. Tracking numbers
    /// are generated optimistically and regenerated when the unique
    /// constraint reports a collision.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown order,
    /// [`StoreError::Conflict`] when the order already has a shipment, or any
    /// other [`StoreError`] when the store fails.
    pub async fn create(
        &self,
        order_id: OrderId,
        carrier: Option<String>,
        now: Timestamp,
    ) -> Result<Shipment, StoreError> {
        let order = self.store.order(order_id).await?;

        for _ in 0..MAX_TRACKING_NUMBER_ATTEMPTS {
            let tracking_number = {
                let mut rng = rand::thread_rng();
                numbers::tracking_number(now, &mut rng)
            };

            let shipment = Shipment::new(order.id(), tracking_number, carrier.clone(), now);

            match self.store.insert_shipment(&shipment).await {
                Ok(()) => {
                    info!(
                        %order_id,
                        tracking_number = shipment.tracking_number(),
                        "shipment created"
                    );

                    return Ok(shipment);
                }
                Err(StoreError::Conflict) => {
                    // Either the tracking number collided or the order
                    // already has a shipment; only the former is retryable.
                    if self.store.shipment_for_order(order_id).await.is_ok() {
                        return Err(StoreError::Conflict);
                    }
                }
                Err(other) => return Err(other),
            }
        }

        Err(StoreError::Conflict)
    }

    /// Hand the order's parcel to the carrier and cascade the order to
    /// shipped. Returns `false` when the shipment was past preparing.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the order has no shipment, or
    /// any other [`StoreError`] when the store fails.
    pub async fn ship(
        &self,
        order_id: OrderId,
        tracking_number: Option<String>,
        carrier: Option<String>,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut shipment = self.store.shipment_for_order(order_id).await?;

        let Some(event) = shipment.mark_as_shipped(tracking_number, carrier, now) else {
            return Ok(false);
        };

        self.store.save_shipment(&shipment).await?;
        self.apply_order_cascade(order_id, event, now).await;

        Ok(true)
    }

    /// Record carrier network movement. Returns `false` when the shipment
    /// was not shipped.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the order has no shipment, or
    /// any other [`StoreError`] when the store fails.
    pub async fn mark_as_in_transit(
        &self,
        order_id: OrderId,
        now: Timestamp,
    ) -> Result<bool, StoreError> {
        let mut shipment = self.store.shipment_for_order(order_id).await?;

        if !shipment.mark_as_in_transit(now) {
            return Ok(false);
        }

        self.store.save_shipment(&shipment).await?;

        Ok(true)
    }

    /// Record arrival and cascade the order to delivered. Returns `false`
    /// when the shipment was neither shipped nor in transit.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the order has no shipment, or
    /// any other [`StoreError`] when the store fails.
    pub async fn deliver(&self, order_id: OrderId, now: Timestamp) -> Result<bool, StoreError> {
        let mut shipment = self.store.shipment_for_order(order_id).await?;

        let Some(event) = shipment.mark_as_delivered(now) else {
            return Ok(false);
        };

        self.store.save_shipment(&shipment).await?;
        self.apply_order_cascade(order_id, event, now).await;

        Ok(true)
    }

    /// Apply a shipment event to the order. Retried once and logged when it
    /// still fails, never silently dropped.
    async fn apply_order_cascade(&self, order_id: OrderId, event: ShipmentEvent, now: Timestamp) {
        let apply = || async {
            let mut order = self.store.order(order_id).await?;

            let applied = match event {
                ShipmentEvent::Shipped => order.mark_as_shipped(now),
                ShipmentEvent::Delivered => order.mark_as_delivered(now),
            };

            if applied {
                self.store.save_order(&order).await?;
            } else {
                warn!(%order_id, ?event, status = order.status().as_str(), "shipment cascade refused by order guard");
            }

            Ok::<_, StoreError>(())
        };

        if let Err(error) = apply().await {
            warn!(%order_id, ?event, %error, "shipment cascade failed, retrying");
            if let Err(error) = apply().await {
                tracing::error!(%order_id, ?event, %error, "shipment cascade dropped");
            }
        }
    }
}
