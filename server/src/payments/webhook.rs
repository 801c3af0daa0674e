//! Signed webhook deliveries from the payment provider.
//!
//! The signature header has the form `t=<unix seconds>,v1=<hex hmac>[,v1=...]`
//! where each `v1` is HMAC-SHA256 of `"<t>.<raw body>"` under the endpoint
//! secret. Deliveries outside the timestamp tolerance are rejected so a
//! captured payload cannot be replayed indefinitely; replays inside the window
//! are harmless because reconciliation is idempotent.

use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use super::stripe::CheckoutSessionObject;
use super::SessionStatus;
use crate::booking::reconciliation::{ConfirmationSource, PaymentConfirmation, PaymentOutcome};
use crate::utils::error::AppError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

fn compute_signature(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InternalServerError("invalid webhook secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Header value for `payload` signed at `timestamp`.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, AppError> {
    Ok(format!(
        "t={timestamp},v1={}",
        compute_signature(payload, secret, timestamp)?
    ))
}

pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: DateTime<Utc>,
    tolerance: Duration,
) -> Result<(), AppError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| AppError::AuthError("webhook signature missing timestamp".to_string()))?;
    if signatures.is_empty() {
        return Err(AppError::AuthError(
            "webhook signature missing v1 entry".to_string(),
        ));
    }

    let age = now.timestamp() - timestamp;
    if age.abs() > tolerance.num_seconds() {
        return Err(AppError::AuthError(
            "webhook timestamp outside tolerance".to_string(),
        ));
    }

    let expected = compute_signature(payload, secret, timestamp)?;
    let matched = signatures
        .iter()
        .any(|candidate| constant_time_eq::constant_time_eq(candidate.as_bytes(), expected.as_bytes()));
    if matched {
        Ok(())
    } else {
        Err(AppError::AuthError("webhook signature mismatch".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: CheckoutSessionObject,
}

impl WebhookEvent {
    /// `None` for event types that carry no final outcome.
    pub fn into_confirmation(self) -> Option<PaymentConfirmation> {
        let session = self.data.object;
        let outcome = match self.kind.as_str() {
            "checkout.session.completed" => match session.session_status() {
                SessionStatus::Paid => PaymentOutcome::Succeeded,
                // Delayed payment methods settle later via async_payment_* events
                _ => return None,
            },
            "checkout.session.async_payment_succeeded" => PaymentOutcome::Succeeded,
            "checkout.session.expired" => PaymentOutcome::Failed {
                reason: "checkout session expired".to_string(),
            },
            "checkout.session.async_payment_failed" => PaymentOutcome::Failed {
                reason: "asynchronous payment failed".to_string(),
            },
            _ => return None,
        };

        let details = session.into_details();
        Some(PaymentConfirmation {
            external_reference: details.id,
            reservation_id: details.metadata.as_ref().and_then(|m| m.reservation_id),
            metadata: details.metadata,
            amount: details.amount_total,
            method: details.payment_method,
            outcome,
            source: ConfirmationSource::Webhook,
        })
    }
}
