use axum::extract::{Path, State};
use axum::response::Response;
use uuid::Uuid;

use super::{CurrentUser, JsonBody};
use crate::models::NewEvent;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

pub async fn create_event(
    State(state): State<AppState>,
    CurrentUser(owner_id): CurrentUser,
    JsonBody(new_event): JsonBody<NewEvent>,
) -> Result<Response, AppError> {
    let event = state.booking.create_event(owner_id, new_event).await?;
    Ok(created(event, "Event created"))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state.booking.event(event_id).await?;
    Ok(success(event, "Event retrieved"))
}
