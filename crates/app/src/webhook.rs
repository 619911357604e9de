//! Payment processor webhook
//!
//! The processor notifies payment status changes with a JSON body signed by
//! HMAC-SHA256 over the raw bytes, hex-encoded in the `X-Payment-Signature`
//! header. No user is authenticated on this path, so the signature is the
//! only gate: verification happens in constant time before the body is even
//! parsed, and a bad or missing signature mutates nothing.

use std::sync::Arc;

use hmac::{Hmac, Mac};
use jiff::Timestamp;
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::{
    payments::PaymentService,
    store::{CommerceStore, StoreError},
};
use folio_core::payment::Payment;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex HMAC-SHA256 signature of the raw body.
pub const SIGNATURE_HEADER: &str = "X-Payment-Signature";

/// Failures of webhook handling. Authentication failures must surface as an
/// unauthenticated HTTP status with no body detail.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The signature header was absent.
    #[error("missing webhook signature")]
    MissingSignature,

    /// The signature did not match the body.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// The body was not valid JSON of the expected shape.
    #[error("malformed webhook payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload named neither a payment id nor a transaction id.
    #[error("webhook payload does not identify a payment")]
    NoPaymentReference,

    /// The store failed or the referenced payment does not exist.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Parsed webhook body.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    /// Processor transaction reference.
    #[serde(default)]
    pub transaction_id: Option<String>,

    /// Our payment id, when the processor echoes it back.
    #[serde(default)]
    pub payment_id: Option<folio_core::ids::PaymentId>,

    /// Processor status word.
    pub status: String,

    /// Optional human-readable detail, recorded on failures.
    #[serde(default)]
    pub message: Option<String>,
}

/// What a verified webhook did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Payment completed; order confirmation cascaded.
    Completed,

    /// Payment marked failed.
    Failed,

    /// Payment refunded; order cancellation and stock restore cascaded.
    Refunded,

    /// The status word was unrecognised, or the transition guard refused it;
    /// nothing changed.
    Ignored,
}

/// Verifies and applies payment processor webhooks.
#[derive(Clone)]
pub struct WebhookHandler {
    secret: Arc<Zeroizing<Vec<u8>>>,
    store: Arc<dyn CommerceStore>,
    payments: PaymentService,
}

impl WebhookHandler {
    /// Build a handler over the shared signing secret.
    #[must_use]
    pub fn new(secret: &str, store: Arc<dyn CommerceStore>) -> Self {
        let payments = PaymentService::new(Arc::clone(&store));

        Self {
            secret: Arc::new(Zeroizing::new(secret.as_bytes().to_vec())),
            store,
            payments,
        }
    }

    /// Verify and apply one webhook request.
    ///
    /// `signature` is the value of the [`SIGNATURE_HEADER`] header, when
    /// present. Unrecognised status words are ignored without error; guard
    /// refusals (e.g. a completion for an already-completed payment) come
    /// back as [`WebhookOutcome::Ignored`].
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::MissingSignature`] or
    /// [`WebhookError::InvalidSignature`] before anything is read,
    /// [`WebhookError::Malformed`] for an undecodable body, and store
    /// failures otherwise. No state is mutated on any error path.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
        now: Timestamp,
    ) -> Result<WebhookOutcome, WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        self.verify(raw_body, signature)?;

        let payload: WebhookPayload = serde_json::from_slice(raw_body)?;

        let outcome = match payload.status.as_str() {
            "success" | "completed" => {
                let payment = self.locate(&payload).await?;
                let applied = self
                    .payments
                    .complete(payment.id(), payload.transaction_id.clone(), now)
                    .await?;

                applied_or_ignored(applied, WebhookOutcome::Completed)
            }
            "failed" | "declined" => {
                let payment = self.locate(&payload).await?;
                let applied = self
                    .payments
                    .fail(payment.id(), payload.message.as_deref(), now)
                    .await?;

                applied_or_ignored(applied, WebhookOutcome::Failed)
            }
            "refunded" => {
                let payment = self.locate(&payload).await?;
                let applied = self
                    .payments
                    .refund(payment.id(), None, Some("refunded by payment processor"), now)
                    .await?;

                applied_or_ignored(applied, WebhookOutcome::Refunded)
            }
            other => {
                info!(status = other, "ignoring webhook with unrecognised status");
                WebhookOutcome::Ignored
            }
        };

        if outcome == WebhookOutcome::Ignored {
            warn!(status = %payload.status, "webhook applied no transition");
        }

        Ok(outcome)
    }

    /// Constant-time signature check over the raw body.
    fn verify(&self, raw_body: &[u8], signature: &str) -> Result<(), WebhookError> {
        let supplied = hex::decode(signature).map_err(|_| WebhookError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(raw_body);

        mac.verify_slice(&supplied)
            .map_err(|_| WebhookError::InvalidSignature)
    }

    /// Resolve the payment the payload refers to, preferring our own id over
    /// the processor's transaction reference.
    async fn locate(&self, payload: &WebhookPayload) -> Result<Payment, WebhookError> {
        if let Some(payment_id) = payload.payment_id {
            return Ok(self.store.payment(payment_id).await?);
        }

        if let Some(transaction_id) = payload.transaction_id.as_deref() {
            return Ok(self.store.payment_by_transaction(transaction_id).await?);
        }

        Err(WebhookError::NoPaymentReference)
    }
}

fn applied_or_ignored(applied: bool, outcome: WebhookOutcome) -> WebhookOutcome {
    if applied { outcome } else { WebhookOutcome::Ignored }
}

/// Compute the hex signature for a body, exposed for tests and for signing
/// outbound simulator traffic.
#[must_use]
pub fn sign(secret: &str, raw_body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length.
        Err(_) => return String::new(),
    };
    mac.update(raw_body);

    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use crate::store::memory::MemoryStore;

    use super::*;

    const SECRET: &str = "whsec_folio_test";

    fn handler() -> WebhookHandler {
        WebhookHandler::new(SECRET, Arc::new(MemoryStore::new()))
    }

    fn now() -> Timestamp {
        Timestamp::UNIX_EPOCH
    }

    #[tokio::test]
    async fn missing_signature_is_rejected() {
        let result = handler().handle(b"{}", None, now()).await;

        assert!(matches!(result, Err(WebhookError::MissingSignature)), "got {result:?}");
    }

    #[tokio::test]
    async fn wrong_signature_is_rejected_before_parsing() {
        let body = b"not even json";
        let signature = sign("wrong secret", body);

        let result = handler().handle(body, Some(&signature), now()).await;

        assert!(matches!(result, Err(WebhookError::InvalidSignature)), "got {result:?}");
    }

    #[tokio::test]
    async fn tampered_body_is_rejected() {
        let signature = sign(SECRET, br#"{"status":"completed"}"#);

        let result = handler()
            .handle(br#"{"status":"refunded"}"#, Some(&signature), now())
            .await;

        assert!(matches!(result, Err(WebhookError::InvalidSignature)), "got {result:?}");
    }

    #[tokio::test]
    async fn malformed_payload_fails_after_verification() {
        let body = b"{\"status\":12}";
        let signature = sign(SECRET, body);

        let result = handler().handle(body, Some(&signature), now()).await;

        assert!(matches!(result, Err(WebhookError::Malformed(_))), "got {result:?}");
    }

    #[tokio::test]
    async fn unrecognised_status_is_silently_ignored() -> TestResult {
        let body = br#"{"status":"chargeback_opened","transaction_id":"txn_9"}"#;
        let signature = sign(SECRET, body);

        let outcome = handler().handle(body, Some(&signature), now()).await?;

        assert_eq!(outcome, WebhookOutcome::Ignored);

        Ok(())
    }

    #[tokio::test]
    async fn payload_without_payment_reference_is_rejected() {
        let body = br#"{"status":"completed"}"#;
        let signature = sign(SECRET, body);

        let result = handler().handle(body, Some(&signature), now()).await;

        assert!(matches!(result, Err(WebhookError::NoPaymentReference)), "got {result:?}");
    }
}
