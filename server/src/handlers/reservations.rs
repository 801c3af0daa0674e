use axum::extract::{Path, State};
use axum::response::Response;
use serde::Deserialize;
use uuid::Uuid;

use super::{CurrentUser, JsonBody};
use crate::booking::reservations::CreateReservation;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

#[derive(Debug, Deserialize)]
pub struct CreateReservationBody {
    pub event_id: Uuid,
    pub quantity: i32,
    pub promo_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelReservationBody {
    /// Omitted means every remaining ticket.
    pub tickets: Option<i32>,
}

pub async fn create_reservation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    JsonBody(body): JsonBody<CreateReservationBody>,
) -> Result<Response, AppError> {
    let reservation = state
        .booking
        .create_reservation(CreateReservation {
            event_id: body.event_id,
            user_id,
            quantity: body.quantity,
            promo_code: body.promo_code.filter(|code| !code.trim().is_empty()),
        })
        .await?;
    Ok(created(reservation, "Reservation created"))
}

pub async fn list_reservations(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Response, AppError> {
    let reservations = state.booking.reservations_for_user(user_id).await?;
    Ok(success(reservations, "Reservations retrieved"))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(reservation_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let reservation = state.booking.reservation(reservation_id, user_id).await?;
    Ok(success(reservation, "Reservation retrieved"))
}

pub async fn cancel_reservation(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Path(reservation_id): Path<Uuid>,
    JsonBody(body): JsonBody<CancelReservationBody>,
) -> Result<Response, AppError> {
    let tickets = match body.tickets {
        Some(tickets) => tickets,
        None => state.booking.reservation(reservation_id, user_id).await?.number_of_tickets,
    };
    let outcome = state
        .booking
        .cancel_reservation(reservation_id, tickets, user_id)
        .await?;
    Ok(success(outcome, "Reservation cancelled"))
}
