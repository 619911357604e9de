//! Folio
//!
//! Folio is a bookstore commerce core: cart management, checkout snapshotting,
//! and the order, payment and shipment state machines, written as pure
//! synchronous domain logic. Persistence and orchestration live in
//! `folio-app`; time is always threaded in as an explicit [`jiff::Timestamp`].

pub mod address;
pub mod cart;
pub mod catalog;
pub mod ids;
pub mod numbers;
pub mod order;
pub mod payment;
pub mod shipment;
