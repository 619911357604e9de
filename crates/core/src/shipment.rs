//! Shipments
//!
//! One shipment per order, tracking the parcel from preparation to delivery.
//! Like payments, transitions that oblige the caller to move the order along
//! (shipped, delivered) return a [`ShipmentEvent`] for the orchestrator to
//! apply; the shipment never mutates the order itself.

use std::str::FromStr;

use jiff::{Timestamp, ToSpan};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{OrderId, ShipmentId};

/// Fallback delivery estimate for shipments that have not shipped yet.
const UNSHIPPED_ESTIMATE_HOURS: i64 = 7 * 24;

/// Transit estimate for carriers we have no figures for.
const DEFAULT_TRANSIT_DAYS: i64 = 5;

/// Where the parcel is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    /// Being packed, not yet with the carrier.
    Preparing,

    /// Handed to the carrier.
    Shipped,

    /// Moving through the carrier network.
    InTransit,

    /// Received by the customer.
    Delivered,
}

impl ShipmentStatus {
    /// Stable storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Shipped => "shipped",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
        }
    }
}

/// A status string read back from storage was not recognised.
#[derive(Debug, Error)]
#[error("unrecognised shipment status {0:?}")]
pub struct ParseShipmentStatusError(String);

impl FromStr for ShipmentStatus {
    type Err = ParseShipmentStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "preparing" => Ok(Self::Preparing),
            "shipped" => Ok(Self::Shipped),
            "in_transit" => Ok(Self::InTransit),
            "delivered" => Ok(Self::Delivered),
            other => Err(ParseShipmentStatusError(other.to_string())),
        }
    }
}

/// Order-side follow-up owed after a successful shipment transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShipmentEvent {
    /// The parcel shipped; the order must be marked shipped.
    Shipped,

    /// The parcel arrived; the order must be marked delivered.
    Delivered,
}

/// Stored field set of a shipment, used to rehydrate [`Shipment`] from a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipmentParts {
    /// Shipment identifier.
    pub id: ShipmentId,
    /// Order being fulfilled.
    pub order_id: OrderId,
    /// Globally unique carrier-facing reference.
    pub tracking_number: String,
    /// Carrier name, free-form.
    pub carrier: Option<String>,
    /// Where the parcel is.
    pub status: ShipmentStatus,
    /// When the parcel was handed to the carrier.
    pub shipped_at: Option<Timestamp>,
    /// When the parcel arrived.
    pub delivered_at: Option<Timestamp>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

/// A shipment and its guarded state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    parts: ShipmentParts,
}

impl From<ShipmentParts> for Shipment {
    fn from(parts: ShipmentParts) -> Self {
        Self { parts }
    }
}

impl Shipment {
    /// Open a shipment in the preparing state.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        tracking_number: String,
        carrier: Option<String>,
        now: Timestamp,
    ) -> Self {
        Self {
            parts: ShipmentParts {
                id: ShipmentId::new(),
                order_id,
                tracking_number,
                carrier,
                status: ShipmentStatus::Preparing,
                shipped_at: None,
                delivered_at: None,
                notes: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Shipment identifier.
    #[must_use]
    pub fn id(&self) -> ShipmentId {
        self.parts.id
    }

    /// Order being fulfilled.
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        self.parts.order_id
    }

    /// Carrier-facing tracking reference.
    #[must_use]
    pub fn tracking_number(&self) -> &str {
        &self.parts.tracking_number
    }

    /// Carrier name, if chosen yet.
    #[must_use]
    pub fn carrier(&self) -> Option<&str> {
        self.parts.carrier.as_deref()
    }

    /// Where the parcel is.
    #[must_use]
    pub fn status(&self) -> ShipmentStatus {
        self.parts.status
    }

    /// When the parcel was handed to the carrier, if it has been.
    #[must_use]
    pub fn shipped_at(&self) -> Option<Timestamp> {
        self.parts.shipped_at
    }

    /// When the parcel arrived, if it has.
    #[must_use]
    pub fn delivered_at(&self) -> Option<Timestamp> {
        self.parts.delivered_at
    }

    /// The stored field set, for persistence.
    #[must_use]
    pub fn parts(&self) -> &ShipmentParts {
        &self.parts
    }

    /// Hand the parcel to the carrier: preparing to shipped only. Stamps
    /// `shipped_at` once; tracking number and carrier are updated when the
    /// caller supplies fresh values.
    ///
    /// Returns [`ShipmentEvent::Shipped`]; the caller must mark the order
    /// shipped.
    pub fn mark_as_shipped(
        &mut self,
        tracking_number: Option<String>,
        carrier: Option<String>,
        now: Timestamp,
    ) -> Option<ShipmentEvent> {
        if self.parts.status != ShipmentStatus::Preparing {
            return None;
        }

        self.parts.status = ShipmentStatus::Shipped;
        self.parts.shipped_at.get_or_insert(now);
        if let Some(tracking_number) = tracking_number {
            self.parts.tracking_number = tracking_number;
        }
        if carrier.is_some() {
            self.parts.carrier = carrier;
        }
        self.parts.updated_at = now;

        Some(ShipmentEvent::Shipped)
    }

    /// Record carrier network movement: shipped to in-transit only.
    pub fn mark_as_in_transit(&mut self, now: Timestamp) -> bool {
        if self.parts.status != ShipmentStatus::Shipped {
            return false;
        }

        self.parts.status = ShipmentStatus::InTransit;
        self.parts.updated_at = now;

        true
    }

    /// Record arrival: shipped or in-transit to delivered. Stamps
    /// `delivered_at` once.
    ///
    /// Returns [`ShipmentEvent::Delivered`]; the caller must mark the order
    /// delivered.
    pub fn mark_as_delivered(&mut self, now: Timestamp) -> Option<ShipmentEvent> {
        if !matches!(
            self.parts.status,
            ShipmentStatus::Shipped | ShipmentStatus::InTransit
        ) {
            return None;
        }

        self.parts.status = ShipmentStatus::Delivered;
        self.parts.delivered_at.get_or_insert(now);
        self.parts.updated_at = now;

        Some(ShipmentEvent::Delivered)
    }

    /// Delivery estimate: carrier transit time from `shipped_at` once
    /// shipped, otherwise a week from creation.
    #[must_use]
    pub fn estimated_delivery(&self) -> Timestamp {
        match self.parts.shipped_at {
            Some(shipped_at) => {
                shipped_at + (transit_days(self.parts.carrier.as_deref()) * 24).hours()
            }
            None => self.parts.created_at + UNSHIPPED_ESTIMATE_HOURS.hours(),
        }
    }

    /// Whether the parcel has shipped but missed its delivery estimate.
    #[must_use]
    pub fn is_delayed(&self, now: Timestamp) -> bool {
        self.parts.status != ShipmentStatus::Delivered
            && self.parts.shipped_at.is_some()
            && now > self.estimated_delivery()
    }
}

/// Expected transit days for a carrier. International express couriers run
/// fastest, the postal service slowest; unknown carriers get a conservative
/// middle estimate.
fn transit_days(carrier: Option<&str>) -> i64 {
    let Some(carrier) = carrier else {
        return DEFAULT_TRANSIT_DAYS;
    };

    match carrier.trim().to_lowercase().as_str() {
        "dhl" | "fedex" | "ups" => 2,
        "delhivery" | "blue dart" | "bluedart" | "dtdc" => 3,
        "india post" | "speed post" => 7,
        "local courier" => 1,
        _ => DEFAULT_TRANSIT_DAYS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::UNIX_EPOCH
    }

    fn shipment(carrier: Option<&str>) -> Shipment {
        Shipment::new(
            OrderId::new(),
            "TRK1970010100042".to_string(),
            carrier.map(str::to_string),
            now(),
        )
    }

    #[test]
    fn shipping_stamps_once_and_emits_event() {
        let mut shipment = shipment(None);

        let event = shipment.mark_as_shipped(None, Some("DHL".to_string()), now());

        assert_eq!(event, Some(ShipmentEvent::Shipped));
        assert_eq!(shipment.status(), ShipmentStatus::Shipped);
        assert_eq!(shipment.shipped_at(), Some(now()));
        assert_eq!(shipment.carrier(), Some("DHL"));

        // Already shipped: no restamp, no event.
        let again = shipment.mark_as_shipped(None, None, now() + 1.hour());
        assert_eq!(again, None);
        assert_eq!(shipment.shipped_at(), Some(now()));
    }

    #[test]
    fn in_transit_requires_shipped() {
        let mut shipment = shipment(None);

        assert!(!shipment.mark_as_in_transit(now()));

        assert!(shipment.mark_as_shipped(None, None, now()).is_some());
        assert!(shipment.mark_as_in_transit(now()));
        assert_eq!(shipment.status(), ShipmentStatus::InTransit);
    }

    #[test]
    fn delivery_allowed_from_shipped_or_in_transit() {
        let mut direct = shipment(None);
        assert!(direct.mark_as_shipped(None, None, now()).is_some());
        assert_eq!(
            direct.mark_as_delivered(now()),
            Some(ShipmentEvent::Delivered)
        );

        let mut via_transit = shipment(None);
        assert!(via_transit.mark_as_shipped(None, None, now()).is_some());
        assert!(via_transit.mark_as_in_transit(now()));
        assert_eq!(
            via_transit.mark_as_delivered(now()),
            Some(ShipmentEvent::Delivered)
        );

        let mut preparing = shipment(None);
        assert_eq!(preparing.mark_as_delivered(now()), None);
        assert_eq!(preparing.status(), ShipmentStatus::Preparing);
    }

    #[test]
    fn delivered_at_is_stamped_once() {
        let mut shipment = shipment(None);
        assert!(shipment.mark_as_shipped(None, None, now()).is_some());
        assert!(shipment.mark_as_delivered(now()).is_some());

        assert_eq!(shipment.mark_as_delivered(now() + 1.hour()), None);
        assert_eq!(shipment.delivered_at(), Some(now()));
    }

    #[test]
    fn estimate_uses_carrier_transit_days() {
        let mut express = shipment(Some("FedEx"));
        assert!(express.mark_as_shipped(None, None, now()).is_some());
        assert_eq!(express.estimated_delivery(), now() + (2 * 24).hours());

        let mut postal = shipment(Some("India Post"));
        assert!(postal.mark_as_shipped(None, None, now()).is_some());
        assert_eq!(postal.estimated_delivery(), now() + (7 * 24).hours());

        let mut unknown = shipment(Some("Rocket Vans"));
        assert!(unknown.mark_as_shipped(None, None, now()).is_some());
        assert_eq!(unknown.estimated_delivery(), now() + (5 * 24).hours());
    }

    #[test]
    fn estimate_before_shipping_counts_from_creation() {
        let shipment = shipment(Some("DHL"));

        assert_eq!(shipment.estimated_delivery(), now() + (7 * 24).hours());
    }

    #[test]
    fn delay_requires_shipped_and_a_missed_estimate() {
        let mut shipment = shipment(Some("Local Courier"));
        assert!(!shipment.is_delayed(now() + (30 * 24).hours()), "unshipped parcels are never delayed");

        assert!(shipment.mark_as_shipped(None, None, now()).is_some());
        assert!(!shipment.is_delayed(now() + 12.hours()));
        assert!(shipment.is_delayed(now() + (2 * 24).hours()));

        assert!(shipment.mark_as_delivered(now() + (2 * 24).hours()).is_some());
        assert!(!shipment.is_delayed(now() + (30 * 24).hours()), "delivered parcels are never delayed");
    }
}
