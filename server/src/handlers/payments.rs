use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{CurrentUser, JsonBody};
use crate::payments::webhook::{
    verify_signature, WebhookEvent, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER,
};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

#[derive(Debug, Deserialize)]
pub struct VerifyPaymentBody {
    pub session_id: String,
}

pub async fn verify_payment(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    JsonBody(body): JsonBody<VerifyPaymentBody>,
) -> Result<Response, AppError> {
    let session_id = body.session_id.trim();
    if session_id.is_empty() {
        return Err(AppError::ValidationError(
            "session_id must not be empty".to_string(),
        ));
    }
    let outcome = state.booking.verify_checkout(session_id, user_id).await?;
    let message = if outcome.already_processed {
        "Payment already processed"
    } else {
        "Payment confirmed"
    };
    Ok(success(outcome, message))
}

/// Provider callback. Client errors are acknowledged with 200 so the provider
/// stops redelivering; only server errors ask for a retry.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let secret = state
        .config
        .payments
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::AuthError("webhook endpoint is not configured".to_string()))?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::AuthError("missing webhook signature".to_string()))?;
    let now = state.booking.clock().now();
    verify_signature(
        &body,
        signature,
        secret,
        now,
        Duration::seconds(DEFAULT_TOLERANCE_SECS),
    )?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| AppError::ValidationError(format!("malformed webhook payload: {e}")))?;
    let event_id = event.id.clone();
    let kind = event.kind.clone();

    let Some(confirmation) = event.into_confirmation() else {
        info!(%event_id, %kind, "Webhook event ignored");
        return Ok(success(json!({ "result": "ignored" }), "Webhook received"));
    };

    match state.booking.apply_payment(confirmation).await {
        Ok(reconciliation) => Ok(success(reconciliation, "Webhook processed")),
        Err(e) if e.is_client_error() => {
            warn!(%event_id, %kind, code = e.code(), error = %e, "Webhook rejected by reconciliation");
            Ok(success(
                json!({ "result": "rejected", "code": e.code() }),
                "Webhook received",
            ))
        }
        Err(e) => Err(e),
    }
}
