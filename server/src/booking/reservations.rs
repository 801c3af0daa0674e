//! Reservation state machine.
//!
//! ```text
//! create ──(paid event)──> Pending ──confirm──> Confirmed
//!    │                        │                    │
//!    └──(free event)──────────┼──> Confirmed       │
//!                             │                    │
//!              payment failed / hold expired /     │
//!              cancel (all tickets)                │ cancel (all tickets)
//!                             ▼                    ▼
//!                          Cancelled <─────────────┘
//! ```
//!
//! Partial cancellation keeps the status and prorates the total.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{ledger, promo, revenue, BookingService};
use crate::models::money::{prorate, reservation_total};
use crate::models::{Event, PaymentStatus, Reservation, ReservationStatus};
use crate::notify::{dispatch, Notification, NotificationKind};
use crate::payments::{CheckoutMetadata, CheckoutRequest, CheckoutSession};
use crate::store::StoreTx;
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateReservation {
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub quantity: i32,
    pub promo_code: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedReservation {
    pub reservation: Reservation,
    /// Present when the reservation awaits payment.
    pub checkout: Option<CheckoutSession>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub reservation: Reservation,
    pub released_tickets: i32,
    pub refund_amount: Decimal,
}

/// Capacity check, promo claim and insert as one unit inside `tx`.
///
/// With `paid_reference` the reservation is written already confirmed and
/// tied to that payment; otherwise paid events start pending.
pub(crate) async fn book_in(
    tx: &mut dyn StoreTx,
    request: &CreateReservation,
    now: DateTime<Utc>,
    paid_reference: Option<&str>,
) -> Result<(Reservation, Event), AppError> {
    let hold = ledger::try_reserve(
        tx,
        request.event_id,
        request.user_id,
        request.quantity,
        now,
    )
    .await?;
    let event = hold.event;

    let claimed = match request.promo_code.as_deref() {
        Some(code) => Some(promo::claim(tx, event.id, code, request.user_id, now).await?),
        None => None,
    };
    let discount = claimed.as_ref().map_or(0, |p| p.discount_percent);
    let total_amount = reservation_total(event.unit_price(), request.quantity, discount);

    let status = if paid_reference.is_some() || !event.is_paid || total_amount.is_zero() {
        ReservationStatus::Confirmed
    } else {
        ReservationStatus::Pending
    };

    let reservation = Reservation {
        id: Uuid::new_v4(),
        event_id: event.id,
        user_id: request.user_id,
        number_of_tickets: request.quantity,
        total_amount,
        status,
        applied_promo_code: claimed.map(|p| p.id),
        external_payment_reference: paid_reference.map(str::to_string),
        created_at: now,
        updated_at: now,
    };
    tx.insert_reservation(&reservation).await?;

    info!(
        reservation_id = %reservation.id,
        event_id = %event.id,
        user_id = %request.user_id,
        tickets = request.quantity,
        total = %total_amount,
        status = ?status,
        remaining = hold.remaining,
        "Reservation booked"
    );
    Ok((reservation, event))
}

/// Cancels a reservation that was never paid and gives back its promo claim.
pub(crate) async fn abandon_in(
    tx: &mut dyn StoreTx,
    reservation: &mut Reservation,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    reservation.status = ReservationStatus::Cancelled;
    reservation.updated_at = now;
    tx.update_reservation(reservation).await?;
    if let Some(promo_id) = reservation.applied_promo_code {
        promo::release_claim(tx, promo_id).await?;
    }
    Ok(())
}

impl BookingService {
    pub async fn create_reservation(
        &self,
        request: CreateReservation,
    ) -> Result<CreatedReservation, AppError> {
        let max = self.policy.max_tickets_per_reservation;
        if request.quantity < 1 || request.quantity > max {
            return Err(AppError::InvalidQuantity(format!(
                "between 1 and {max} tickets may be reserved at once"
            )));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let (reservation, event) = book_in(tx.as_mut(), &request, now, None).await?;
        if reservation.status == ReservationStatus::Confirmed {
            revenue::recompute_in(tx.as_mut(), event.owner_id, now).await?;
        }
        tx.commit().await?;

        if reservation.status == ReservationStatus::Confirmed {
            self.notify(NotificationKind::ReservationConfirmed, &reservation, &event, reservation.total_amount);
            return Ok(CreatedReservation {
                reservation,
                checkout: None,
            });
        }

        let checkout = CheckoutRequest {
            reservation_id: reservation.id,
            description: format!("{} x{}", event.title, reservation.number_of_tickets),
            amount: reservation.total_amount,
            metadata: CheckoutMetadata {
                reservation_id: Some(reservation.id),
                event_id: event.id,
                user_id: reservation.user_id,
                quantity: reservation.number_of_tickets,
                promo_code: request.promo_code.clone(),
            },
        };
        match self.gateway.create_checkout_session(checkout).await {
            Ok(session) => {
                info!(reservation_id = %reservation.id, session_id = %session.id, "Checkout opened");
                Ok(CreatedReservation {
                    reservation,
                    checkout: Some(session),
                })
            }
            Err(e) => {
                error!(reservation_id = %reservation.id, error = %e, "Could not open checkout, releasing hold");
                if let Err(release_err) = self.release_unpaid(reservation.id).await {
                    error!(reservation_id = %reservation.id, error = %release_err, "Hold release failed; reaper will retry");
                }
                Err(AppError::PaymentFailed(
                    "payment could not be initiated, please retry".to_string(),
                ))
            }
        }
    }

    /// Compensating release for a pending reservation whose payment will not
    /// happen. Returns `None` when the reservation is gone or no longer pending.
    pub async fn release_unpaid(&self, reservation_id: Uuid) -> Result<Option<Reservation>, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let Some(mut reservation) = tx.lock_reservation(reservation_id).await? else {
            return Ok(None);
        };
        if reservation.status != ReservationStatus::Pending {
            return Ok(None);
        }
        abandon_in(tx.as_mut(), &mut reservation, now).await?;
        tx.commit().await?;
        info!(%reservation_id, "Unpaid reservation released");
        Ok(Some(reservation))
    }

    pub async fn cancel_reservation(
        &self,
        reservation_id: Uuid,
        tickets_to_cancel: i32,
        acting_user: Uuid,
    ) -> Result<CancelOutcome, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut reservation = tx
            .lock_reservation(reservation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reservation {reservation_id} not found")))?;
        if reservation.user_id != acting_user {
            return Err(AppError::Forbidden(
                "only the reservation owner may cancel it".to_string(),
            ));
        }
        if !reservation.is_active() {
            return Err(AppError::ReservationNotActive);
        }

        let event = tx
            .get_event(reservation.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {} not found", reservation.event_id)))?;
        if now >= event.start_time - self.policy.cancellation_window {
            return Err(AppError::TooLateToCancel);
        }

        let previous_status = reservation.status;
        let previous_tickets = reservation.number_of_tickets;
        let previous_total = reservation.total_amount;

        let release = ledger::release(&mut reservation, tickets_to_cancel, now)?;
        let full = match release {
            ledger::Release::Full => true,
            ledger::Release::Partial { remaining_tickets } => {
                reservation.total_amount =
                    prorate(previous_total, previous_tickets, remaining_tickets);
                false
            }
        };
        tx.update_reservation(&reservation).await?;

        if full && previous_status == ReservationStatus::Pending {
            if let Some(promo_id) = reservation.applied_promo_code {
                promo::release_claim(tx.as_mut(), promo_id).await?;
            }
        }

        let mut refund_amount = Decimal::ZERO;
        if let Some(mut payment) = tx.payment_for_reservation(reservation.id).await? {
            let refundable = (payment.amount - payment.refunded_amount).max(Decimal::ZERO);
            refund_amount = if full {
                refundable
            } else {
                (previous_total - reservation.total_amount).min(refundable)
            };
            payment.refunded_amount += refund_amount;
            if full {
                payment.status = PaymentStatus::Refunded;
            }
            tx.update_payment(&payment).await?;
        }

        if previous_status == ReservationStatus::Confirmed {
            revenue::recompute_in(tx.as_mut(), event.owner_id, now).await?;
        }
        tx.commit().await?;

        info!(
            %reservation_id,
            cancelled = tickets_to_cancel,
            remaining = if full { 0 } else { reservation.number_of_tickets },
            total = %reservation.total_amount,
            refund = %refund_amount,
            "Reservation cancelled"
        );
        self.notify(NotificationKind::ReservationCancelled, &reservation, &event, refund_amount);

        Ok(CancelOutcome {
            reservation,
            released_tickets: tickets_to_cancel,
            refund_amount,
        })
    }

    /// Visible to the reservation holder and to the event owner.
    pub async fn reservation(
        &self,
        reservation_id: Uuid,
        acting_user: Uuid,
    ) -> Result<Reservation, AppError> {
        let mut tx = self.store.begin().await?;
        let reservation = tx
            .get_reservation(reservation_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("reservation {reservation_id} not found")))?;
        if reservation.user_id == acting_user {
            return Ok(reservation);
        }
        let owns_event = tx
            .get_event(reservation.event_id)
            .await?
            .is_some_and(|e| e.owner_id == acting_user);
        if owns_event {
            Ok(reservation)
        } else {
            warn!(%reservation_id, %acting_user, "Reservation access denied");
            Err(AppError::Forbidden(
                "reservation belongs to another user".to_string(),
            ))
        }
    }

    pub async fn reservations_for_user(&self, user_id: Uuid) -> Result<Vec<Reservation>, AppError> {
        let mut tx = self.store.begin().await?;
        tx.list_user_reservations(user_id).await
    }

    pub(crate) fn notify(
        &self,
        kind: NotificationKind,
        reservation: &Reservation,
        event: &Event,
        amount: Decimal,
    ) {
        dispatch(
            &self.notifier,
            Notification {
                kind,
                recipient: reservation.user_id,
                event_title: event.title.clone(),
                quantity: reservation.number_of_tickets,
                amount,
            },
        );
    }
}
