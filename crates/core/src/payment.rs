//! Payments
//!
//! A payment tracks one attempt to settle an order. Guards follow the same
//! convention as orders: an illegal transition returns a falsy value and
//! changes nothing. Transitions that oblige the caller to touch the order
//! (confirmation on completion, cancellation and restock on refund) return a
//! [`PaymentEvent`] instead of reaching into the order themselves; the
//! orchestrator applies the event.

use std::str::FromStr;

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{OrderId, PaymentId};

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Card payment, credit.
    CreditCard,

    /// Card payment, debit.
    DebitCard,

    /// PayPal wallet.
    Paypal,

    /// Paid in cash when the shipment arrives. Not refundable through the
    /// payment processor.
    CashOnDelivery,
}

impl PaymentMethod {
    /// Stable storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::DebitCard => "debit_card",
            Self::Paypal => "paypal",
            Self::CashOnDelivery => "cash_on_delivery",
        }
    }
}

/// A method string read back from storage was not recognised.
#[derive(Debug, Error)]
#[error("unrecognised payment method {0:?}")]
pub struct ParsePaymentMethodError(String);

impl FromStr for PaymentMethod {
    type Err = ParsePaymentMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit_card" => Ok(Self::CreditCard),
            "debit_card" => Ok(Self::DebitCard),
            "paypal" => Ok(Self::Paypal),
            "cash_on_delivery" => Ok(Self::CashOnDelivery),
            other => Err(ParsePaymentMethodError(other.to_string())),
        }
    }
}

/// Settlement state of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting the processor's verdict.
    Pending,

    /// Funds captured.
    Completed,

    /// Declined or errored; may be retried with a fresh attempt.
    Failed,

    /// Captured funds returned to the customer.
    Refunded,
}

impl PaymentStatus {
    /// Stable storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }
}

/// A status string read back from storage was not recognised.
#[derive(Debug, Error)]
#[error("unrecognised payment status {0:?}")]
pub struct ParsePaymentStatusError(String);

impl FromStr for PaymentStatus {
    type Err = ParsePaymentStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            other => Err(ParsePaymentStatusError(other.to_string())),
        }
    }
}

/// Order-side follow-up owed after a successful payment transition.
#[derive(Debug, Clone, PartialEq)]
pub enum PaymentEvent {
    /// The payment completed; the order must be confirmed.
    Completed,

    /// The payment was refunded; the order must be cancelled and every order
    /// item's stock restored, regardless of whether the refund was partial.
    Refunded {
        /// Amount returned to the customer.
        amount: Decimal,
    },
}

/// Stored field set of a payment, used to rehydrate [`Payment`] from a row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentParts {
    /// Payment identifier.
    pub id: PaymentId,
    /// Order this attempt settles.
    pub order_id: OrderId,
    /// How the customer pays.
    pub method: PaymentMethod,
    /// Settlement state.
    pub status: PaymentStatus,
    /// Amount to capture, equal to the order total.
    pub amount: Decimal,
    /// Processor-issued transaction reference.
    pub transaction_id: Option<String>,
    /// When funds were captured.
    pub completed_at: Option<Timestamp>,
    /// Free-form notes; failures, refunds and retries append here.
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last mutation time.
    pub updated_at: Timestamp,
}

/// A payment attempt and its guarded state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    parts: PaymentParts,
}

impl From<PaymentParts> for Payment {
    fn from(parts: PaymentParts) -> Self {
        Self { parts }
    }
}

impl Payment {
    /// Open a fresh pending attempt against an order.
    #[must_use]
    pub fn new(order_id: OrderId, method: PaymentMethod, amount: Decimal, now: Timestamp) -> Self {
        Self {
            parts: PaymentParts {
                id: PaymentId::new(),
                order_id,
                method,
                status: PaymentStatus::Pending,
                amount,
                transaction_id: None,
                completed_at: None,
                notes: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    /// Payment identifier.
    #[must_use]
    pub fn id(&self) -> PaymentId {
        self.parts.id
    }

    /// Order this attempt settles.
    #[must_use]
    pub fn order_id(&self) -> OrderId {
        self.parts.order_id
    }

    /// How the customer pays.
    #[must_use]
    pub fn method(&self) -> PaymentMethod {
        self.parts.method
    }

    /// Settlement state.
    #[must_use]
    pub fn status(&self) -> PaymentStatus {
        self.parts.status
    }

    /// Amount to capture.
    #[must_use]
    pub fn amount(&self) -> Decimal {
        self.parts.amount
    }

    /// Processor-issued transaction reference, once known.
    #[must_use]
    pub fn transaction_id(&self) -> Option<&str> {
        self.parts.transaction_id.as_deref()
    }

    /// When funds were captured, if they were.
    #[must_use]
    pub fn completed_at(&self) -> Option<Timestamp> {
        self.parts.completed_at
    }

    /// Free-form notes.
    #[must_use]
    pub fn notes(&self) -> Option<&str> {
        self.parts.notes.as_deref()
    }

    /// The stored field set, for persistence.
    #[must_use]
    pub fn parts(&self) -> &PaymentParts {
        &self.parts
    }

    /// Whether a refund is permitted: only captured funds, and never for
    /// cash on delivery.
    #[must_use]
    pub fn can_be_refunded(&self) -> bool {
        self.parts.status == PaymentStatus::Completed
            && self.parts.method != PaymentMethod::CashOnDelivery
    }

    /// Record capture: pending to completed only. Stamps `completed_at` once
    /// and records the transaction reference when one is supplied.
    ///
    /// Returns [`PaymentEvent::Completed`]; the caller must confirm the order.
    pub fn mark_as_completed(
        &mut self,
        transaction_id: Option<String>,
        now: Timestamp,
    ) -> Option<PaymentEvent> {
        if self.parts.status != PaymentStatus::Pending {
            return None;
        }

        self.parts.status = PaymentStatus::Completed;
        self.parts.completed_at.get_or_insert(now);
        if transaction_id.is_some() {
            self.parts.transaction_id = transaction_id;
        }
        self.parts.updated_at = now;

        Some(PaymentEvent::Completed)
    }

    /// Record a decline: pending to failed only.
    pub fn mark_as_failed(&mut self, reason: Option<&str>, now: Timestamp) -> bool {
        if self.parts.status != PaymentStatus::Pending {
            return false;
        }

        self.parts.status = PaymentStatus::Failed;
        if let Some(reason) = reason {
            self.append_note(&format!("Failed: {reason}"));
        }
        self.parts.updated_at = now;

        true
    }

    /// Return funds to the customer. Permitted only when
    /// [`Payment::can_be_refunded`] holds and the requested amount (full
    /// amount when omitted) does not exceed what was paid.
    ///
    /// Returns [`PaymentEvent::Refunded`]; the caller must cancel the order
    /// and restore stock for all of its items.
    pub fn refund(
        &mut self,
        amount: Option<Decimal>,
        reason: Option<&str>,
        now: Timestamp,
    ) -> Option<PaymentEvent> {
        if !self.can_be_refunded() {
            return None;
        }

        let amount = amount.unwrap_or(self.parts.amount);
        if amount <= Decimal::ZERO || amount > self.parts.amount {
            return None;
        }

        self.parts.status = PaymentStatus::Refunded;
        match reason {
            Some(reason) => self.append_note(&format!("Refunded {amount}: {reason}")),
            None => self.append_note(&format!("Refunded {amount}")),
        }
        self.parts.updated_at = now;

        Some(PaymentEvent::Refunded { amount })
    }

    /// Reopen a failed attempt in place: failed to pending only, recording
    /// when the retry happened. The orchestrator-level retry flow instead
    /// opens a brand new attempt via [`Payment::new`] so every attempt stays
    /// on record.
    pub fn retry(&mut self, now: Timestamp) -> bool {
        if self.parts.status != PaymentStatus::Failed {
            return false;
        }

        self.parts.status = PaymentStatus::Pending;
        self.append_note(&format!("Retried at {now}"));
        self.parts.updated_at = now;

        true
    }

    /// Append a line to the payment's notes.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Timestamp {
        Timestamp::UNIX_EPOCH
    }

    fn payment(method: PaymentMethod) -> Payment {
        Payment::new(OrderId::new(), method, Decimal::from(550), now())
    }

    #[test]
    fn completion_stamps_and_emits_event() {
        let mut payment = payment(PaymentMethod::CreditCard);

        let event = payment.mark_as_completed(Some("txn_1".to_string()), now());

        assert_eq!(event, Some(PaymentEvent::Completed));
        assert_eq!(payment.status(), PaymentStatus::Completed);
        assert_eq!(payment.completed_at(), Some(now()));
        assert_eq!(payment.transaction_id(), Some("txn_1"));
    }

    #[test]
    fn completion_requires_pending() {
        let mut payment = payment(PaymentMethod::CreditCard);
        assert!(payment.mark_as_failed(Some("card declined"), now()));

        assert_eq!(payment.mark_as_completed(None, now()), None);
        assert_eq!(payment.status(), PaymentStatus::Failed);
    }

    #[test]
    fn failure_appends_reason() {
        let mut payment = payment(PaymentMethod::DebitCard);

        assert!(payment.mark_as_failed(Some("card declined"), now()));

        assert_eq!(payment.status(), PaymentStatus::Failed);
        assert!(
            payment.notes().is_some_and(|n| n.contains("card declined")),
            "reason should land in notes"
        );
    }

    #[test]
    fn refund_defaults_to_full_amount() {
        let mut payment = payment(PaymentMethod::Paypal);
        assert!(payment.mark_as_completed(None, now()).is_some());

        let event = payment.refund(None, Some("damaged in transit"), now());

        assert_eq!(
            event,
            Some(PaymentEvent::Refunded {
                amount: Decimal::from(550)
            })
        );
        assert_eq!(payment.status(), PaymentStatus::Refunded);
    }

    #[test]
    fn refund_rejects_overpayment_and_cod() {
        let mut card = payment(PaymentMethod::CreditCard);
        assert!(card.mark_as_completed(None, now()).is_some());
        assert_eq!(card.refund(Some(Decimal::from(551)), None, now()), None);
        assert_eq!(card.status(), PaymentStatus::Completed);

        let mut cod = payment(PaymentMethod::CashOnDelivery);
        assert!(cod.mark_as_completed(None, now()).is_some());
        assert!(!cod.can_be_refunded());
        assert_eq!(cod.refund(None, None, now()), None);
    }

    #[test]
    fn refund_requires_completed() {
        let mut payment = payment(PaymentMethod::CreditCard);

        assert_eq!(payment.refund(None, None, now()), None);
        assert_eq!(payment.status(), PaymentStatus::Pending);
    }

    #[test]
    fn retry_reopens_failed_attempts_only() {
        let mut payment = payment(PaymentMethod::CreditCard);
        assert!(!payment.retry(now()), "pending attempts cannot be retried");

        assert!(payment.mark_as_failed(None, now()));
        assert!(payment.retry(now()));

        assert_eq!(payment.status(), PaymentStatus::Pending);
        assert!(
            payment.notes().is_some_and(|n| n.contains("Retried at")),
            "retry should be noted"
        );
    }

    #[test]
    fn enums_round_trip_through_storage_form() {
        for method in [
            PaymentMethod::CreditCard,
            PaymentMethod::DebitCard,
            PaymentMethod::Paypal,
            PaymentMethod::CashOnDelivery,
        ] {
            assert_eq!(
                method.as_str().parse::<PaymentMethod>().ok(),
                Some(method),
                "method {method:?} must round-trip"
            );
        }

        assert!("bank_transfer".parse::<PaymentMethod>().is_err());
        assert!("settled".parse::<PaymentStatus>().is_err());
    }
}
