use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::response::Response;
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::utils::error::AppError;
use crate::utils::response::success;

pub mod auth;
pub mod events;
pub mod payments;
pub mod promo_codes;
pub mod reservations;
pub mod revenue;

pub use auth::CurrentUser;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "booking-api",
    };

    success(payload, "Health check successful")
}

/// `Json` whose rejections use the API error envelope.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::ValidationError(rejection.body_text()))?;
        Ok(Self(value))
    }
}
