//! Folio application services: checkout orchestration, order/payment/shipment
//! lifecycles, the signed payment webhook, and persistence behind the
//! [`store::CommerceStore`] seam.

pub mod carts;
pub mod checkout;
pub mod config;
pub mod context;
pub mod notify;
pub mod orders;
pub mod payments;
pub mod shipments;
pub mod store;
pub mod webhook;
