use axum::extract::State;
use axum::response::Response;
use serde_json::json;

use super::CurrentUser;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::success;

pub async fn get_revenue(
    State(state): State<AppState>,
    CurrentUser(owner_id): CurrentUser,
) -> Result<Response, AppError> {
    let revenue = state.booking.revenue(owner_id).await?;
    Ok(success(revenue, "Revenue retrieved"))
}

pub async fn recompute_revenue(
    State(state): State<AppState>,
    CurrentUser(owner_id): CurrentUser,
) -> Result<Response, AppError> {
    let total = state.booking.recompute_revenue(owner_id).await?;
    Ok(success(
        json!({ "owner_id": owner_id, "total_revenue": total }),
        "Revenue recomputed",
    ))
}
