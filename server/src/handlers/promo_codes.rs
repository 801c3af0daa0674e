use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use super::{CurrentUser, JsonBody};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct IssuePromoCodes {
    pub quantity: i32,
    pub discount_percent: i32,
}

pub async fn issue_promo_codes(
    State(state): State<AppState>,
    CurrentUser(owner_id): CurrentUser,
    Path(event_id): Path<Uuid>,
    JsonBody(body): JsonBody<IssuePromoCodes>,
) -> Result<Response, AppError> {
    let codes = state
        .booking
        .issue_promo_codes(owner_id, event_id, body.quantity, body.discount_percent)
        .await?;
    Ok(created(codes, "Promo codes issued"))
}

pub async fn list_promo_codes(
    State(state): State<AppState>,
    CurrentUser(owner_id): CurrentUser,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let codes = state.booking.list_promo_codes(owner_id, event_id).await?;
    Ok(success(codes, "Promo codes retrieved"))
}
