use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Insufficient capacity: requested {requested}, remaining {remaining}")]
    InsufficientCapacity { requested: i32, remaining: i64 },

    #[error("User already holds an active reservation for this event")]
    DuplicateReservation,

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Event has already ended")]
    EventEnded,

    #[error("Reservations can no longer be cancelled for this event")]
    TooLateToCancel,

    #[error("Promo code is invalid or already used")]
    InvalidOrUsedPromoCode,

    #[error("Reservation is not active")]
    ReservationNotActive,

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error")]
    DatabaseError(#[source] sqlx::Error),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("unique constraint violated: {}", db.message()))
            }
            _ => AppError::DatabaseError(err),
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InsufficientCapacity { .. }
            | AppError::DuplicateReservation
            | AppError::ReservationNotActive
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidQuantity(_)
            | AppError::InvalidOrUsedPromoCode
            | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::EventEnded | AppError::TooLateToCancel => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
            AppError::DuplicateReservation => "DUPLICATE_RESERVATION",
            AppError::InvalidQuantity(_) => "INVALID_QUANTITY",
            AppError::EventEnded => "EVENT_ENDED",
            AppError::TooLateToCancel => "TOO_LATE_TO_CANCEL",
            AppError::InvalidOrUsedPromoCode => "INVALID_OR_USED_PROMO_CODE",
            AppError::ReservationNotActive => "RESERVATION_NOT_ACTIVE",
            AppError::PaymentFailed(_) => "PAYMENT_FAILED",
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::ExternalServiceError(_) => "EXTERNAL_SERVICE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    /// Errors the booking UI can act on (retry with fewer tickets, pick another
    /// code, and so on). Everything else is logged at error level.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    fn log(&self) {
        match self {
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
            AppError::ExternalServiceError(msg) | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::PaymentFailed(msg) => {
                warn!(message = %msg, "Payment failed");
            }
            _ => {
                warn!(code = self.code(), error = %self, "Request rejected");
            }
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::InsufficientCapacity {
                requested,
                remaining,
            } => Some(json!({ "requested": requested, "remaining": remaining })),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        self.log();

        // Internal failures only expose a generic message
        let public_message = match &self {
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        };

        error_response(code, public_message, self.details(), status)
    }
}
