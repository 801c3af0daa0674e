//! Payment reconciliation.
//!
//! The client-side verification call and the provider webhook both end up in
//! [`BookingService::apply_payment`]. Within one transaction it resolves the
//! reservation (by external reference first, then by reservation id, then by
//! booking one from checkout metadata), and either finds the payment already
//! recorded or records it. Whichever delivery arrives second observes the
//! first one's result instead of creating a second payment row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::reservations::{abandon_in, book_in, CreateReservation};
use super::{ledger, promo, revenue, BookingService};
use crate::models::{Event, Payment, PaymentStatus, Reservation, ReservationStatus};
use crate::notify::NotificationKind;
use crate::payments::{CheckoutMetadata, SessionStatus};
use crate::store::StoreTx;
use crate::utils::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded,
    Failed { reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    ClientVerification,
    Webhook,
    Direct,
}

/// Untrusted report from the payment provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub external_reference: String,
    pub reservation_id: Option<Uuid>,
    pub metadata: Option<CheckoutMetadata>,
    /// Amount actually charged, when the provider reports it.
    pub amount: Option<Decimal>,
    pub method: Option<String>,
    pub outcome: PaymentOutcome,
    pub source: ConfirmationSource,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmOutcome {
    pub reservation: Reservation,
    pub payment: Payment,
    /// The payment had already been recorded by an earlier delivery.
    pub already_processed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Reconciliation {
    Confirmed(ConfirmOutcome),
    /// Payment failed; the pending hold was released.
    Released { reservation: Reservation },
    /// Nothing to do: unknown reservation, or the failure arrived after the
    /// reservation left the pending state.
    Ignored { reason: String },
}

enum Resolved {
    Recorded(ConfirmOutcome),
    Settle(Reservation, Event),
}

const DEFAULT_METHOD: &str = "card";

impl BookingService {
    /// `Pending -> Confirmed` for a known reservation. Idempotent per reference.
    pub async fn confirm(
        &self,
        reservation_id: Uuid,
        external_reference: &str,
    ) -> Result<ConfirmOutcome, AppError> {
        let confirmation = PaymentConfirmation {
            external_reference: external_reference.to_string(),
            reservation_id: Some(reservation_id),
            metadata: None,
            amount: None,
            method: None,
            outcome: PaymentOutcome::Succeeded,
            source: ConfirmationSource::Direct,
        };
        match self.apply_payment(confirmation).await? {
            Reconciliation::Confirmed(outcome) => Ok(outcome),
            Reconciliation::Released { .. } | Reconciliation::Ignored { .. } => Err(
                AppError::InternalServerError("successful payment was not confirmed".to_string()),
            ),
        }
    }

    pub async fn apply_payment(
        &self,
        confirmation: PaymentConfirmation,
    ) -> Result<Reconciliation, AppError> {
        if confirmation.external_reference.trim().is_empty() {
            return Err(AppError::ValidationError(
                "payment reference must not be empty".to_string(),
            ));
        }
        match &confirmation.outcome {
            PaymentOutcome::Succeeded => self
                .settle_payment(&confirmation)
                .await
                .map(Reconciliation::Confirmed),
            PaymentOutcome::Failed { reason } => self.fail_payment(&confirmation, reason).await,
        }
    }

    /// Synchronous path: the client returns from checkout and asks us to
    /// check the session with the provider.
    pub async fn verify_checkout(
        &self,
        session_id: &str,
        acting_user: Uuid,
    ) -> Result<ConfirmOutcome, AppError> {
        let session = self.gateway.retrieve_session(session_id).await?;
        let owner = session.metadata.as_ref().map(|m| m.user_id);
        if owner != Some(acting_user) {
            return Err(AppError::Forbidden(
                "checkout session belongs to another user".to_string(),
            ));
        }

        let outcome = match session.status {
            SessionStatus::Paid => PaymentOutcome::Succeeded,
            SessionStatus::Open => {
                return Err(AppError::PaymentFailed(
                    "payment has not been completed yet".to_string(),
                ))
            }
            SessionStatus::Expired | SessionStatus::Failed => PaymentOutcome::Failed {
                reason: format!("checkout session {:?}", session.status).to_lowercase(),
            },
        };

        let confirmation = PaymentConfirmation {
            external_reference: session.id,
            reservation_id: session.metadata.as_ref().and_then(|m| m.reservation_id),
            metadata: session.metadata,
            amount: session.amount_total,
            method: session.payment_method,
            outcome,
            source: ConfirmationSource::ClientVerification,
        };
        match self.apply_payment(confirmation).await? {
            Reconciliation::Confirmed(outcome) => Ok(outcome),
            Reconciliation::Released { .. } | Reconciliation::Ignored { .. } => Err(
                AppError::PaymentFailed("payment was not completed".to_string()),
            ),
        }
    }

    async fn settle_payment(
        &self,
        confirmation: &PaymentConfirmation,
    ) -> Result<ConfirmOutcome, AppError> {
        let now = self.clock.now();
        let reference = confirmation.external_reference.as_str();
        let mut tx = self.store.begin().await?;

        let (mut reservation, event) = match resolve(tx.as_mut(), confirmation, now).await? {
            Resolved::Recorded(outcome) => {
                info!(
                    reference,
                    reservation_id = %outcome.reservation.id,
                    source = ?confirmation.source,
                    "Payment already processed"
                );
                return Ok(outcome);
            }
            Resolved::Settle(reservation, event) => (reservation, event),
        };

        reservation.status = ReservationStatus::Confirmed;
        reservation.external_payment_reference = Some(reference.to_string());
        reservation.updated_at = now;
        tx.update_reservation(&reservation).await?;

        let amount = confirmation.amount.unwrap_or(reservation.total_amount);
        // A checkout opened before a partial cancellation charges the old total
        let overcharge = (amount - reservation.total_amount).max(Decimal::ZERO);
        let payment = Payment {
            id: Uuid::new_v4(),
            reservation_id: reservation.id,
            external_reference: reference.to_string(),
            amount,
            refunded_amount: overcharge,
            method: confirmation
                .method
                .clone()
                .unwrap_or_else(|| DEFAULT_METHOD.to_string()),
            status: PaymentStatus::Paid,
            paid_at: now,
        };
        tx.insert_payment(&payment).await?;
        if payment.amount != reservation.total_amount {
            warn!(
                reservation_id = %reservation.id,
                charged = %payment.amount,
                expected = %reservation.total_amount,
                refunded = %overcharge,
                "Charged amount differs from reservation total"
            );
        }

        if let Some(promo_id) = reservation.applied_promo_code {
            promo::finalize(tx.as_mut(), promo_id, reservation.user_id, now).await?;
        }
        revenue::recompute_in(tx.as_mut(), event.owner_id, now).await?;
        tx.commit().await?;

        info!(
            reference,
            reservation_id = %reservation.id,
            amount = %payment.amount,
            source = ?confirmation.source,
            "Payment confirmed"
        );
        self.notify(
            NotificationKind::ReservationConfirmed,
            &reservation,
            &event,
            payment.amount,
        );

        Ok(ConfirmOutcome {
            reservation,
            payment,
            already_processed: false,
        })
    }

    async fn fail_payment(
        &self,
        confirmation: &PaymentConfirmation,
        reason: &str,
    ) -> Result<Reconciliation, AppError> {
        let now = self.clock.now();
        let reference = confirmation.external_reference.as_str();
        let mut tx = self.store.begin().await?;

        let mut reservation = match tx.lock_reservation_by_reference(reference).await? {
            Some(reservation) => Some(reservation),
            None => match confirmation.reservation_id {
                Some(id) => tx.lock_reservation(id).await?,
                None => None,
            },
        };
        let Some(reservation) = reservation.as_mut() else {
            warn!(reference, reason, "Payment failure for unknown reservation");
            return Ok(Reconciliation::Ignored {
                reason: "no matching reservation".to_string(),
            });
        };
        if reservation.status != ReservationStatus::Pending {
            warn!(
                reference,
                reservation_id = %reservation.id,
                status = ?reservation.status,
                reason,
                "Payment failure for reservation that is not pending"
            );
            return Ok(Reconciliation::Ignored {
                reason: format!("reservation is {:?}", reservation.status).to_lowercase(),
            });
        }

        abandon_in(tx.as_mut(), reservation, now).await?;
        let event = tx.get_event(reservation.event_id).await?;
        tx.commit().await?;

        warn!(
            reference,
            reservation_id = %reservation.id,
            reason,
            source = ?confirmation.source,
            "Payment failed, hold released"
        );
        if let Some(event) = event {
            self.notify(
                NotificationKind::ReservationCancelled,
                reservation,
                &event,
                Decimal::ZERO,
            );
        }
        Ok(Reconciliation::Released {
            reservation: reservation.clone(),
        })
    }
}

/// Finds the reservation a successful payment belongs to, or the payment it
/// already produced.
async fn resolve(
    tx: &mut dyn StoreTx,
    confirmation: &PaymentConfirmation,
    now: DateTime<Utc>,
) -> Result<Resolved, AppError> {
    let reference = confirmation.external_reference.as_str();

    if let Some(reservation) = tx.lock_reservation_by_reference(reference).await? {
        if confirmation
            .reservation_id
            .is_some_and(|id| id != reservation.id)
        {
            return Err(AppError::Conflict(format!(
                "payment reference {reference} belongs to another reservation"
            )));
        }
        return recorded(tx, reservation).await;
    }

    let known = match confirmation.reservation_id {
        Some(id) => tx.lock_reservation(id).await?,
        None => None,
    };
    if let Some(reservation) = known {
        if let Some(payment) = tx.payment_for_reservation(reservation.id).await? {
            // The lookup by reference can miss a delivery that committed
            // while this one waited on the row lock
            if payment.external_reference == reference {
                return Ok(Resolved::Recorded(ConfirmOutcome {
                    reservation,
                    payment,
                    already_processed: true,
                }));
            }
            return Err(AppError::Conflict(format!(
                "reservation {} was already paid under reference {}",
                reservation.id, payment.external_reference
            )));
        }
        let event = tx
            .get_event(reservation.event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {} not found", reservation.event_id)))?;
        return match reservation.status {
            ReservationStatus::Pending => Ok(Resolved::Settle(reservation, event)),
            ReservationStatus::Cancelled => reinstate(tx, reservation, now).await,
            ReservationStatus::Confirmed => Err(AppError::Conflict(format!(
                "reservation {} does not require payment",
                reservation.id
            ))),
        };
    }

    let Some(metadata) = confirmation.metadata.as_ref() else {
        return Err(AppError::NotFound(format!(
            "no reservation matches payment reference {reference}"
        )));
    };

    // Lazily booked reservation. The event lock orders concurrent deliveries
    // of the same reference, so re-check it once the lock is held.
    tx.lock_event(metadata.event_id).await?;
    if let Some(reservation) = tx.lock_reservation_by_reference(reference).await? {
        return recorded(tx, reservation).await;
    }
    let request = CreateReservation {
        event_id: metadata.event_id,
        user_id: metadata.user_id,
        quantity: metadata.quantity,
        promo_code: metadata.promo_code.clone(),
    };
    // Booked as pending so the settle step records payment and promo like any other
    let (mut reservation, event) = book_in(tx, &request, now, None).await?;
    reservation.status = ReservationStatus::Pending;
    Ok(Resolved::Settle(reservation, event))
}

async fn recorded(tx: &mut dyn StoreTx, reservation: Reservation) -> Result<Resolved, AppError> {
    let payment = tx
        .payment_for_reservation(reservation.id)
        .await?
        .ok_or_else(|| {
            AppError::InternalServerError(format!(
                "reservation {} has a payment reference but no payment",
                reservation.id
            ))
        })?;
    Ok(Resolved::Recorded(ConfirmOutcome {
        reservation,
        payment,
        already_processed: true,
    }))
}

/// Payment arrived for a hold that was already released (expired or failed).
/// Take the capacity and the released promo code again if both are still
/// there; otherwise the payment needs a manual refund.
async fn reinstate(
    tx: &mut dyn StoreTx,
    reservation: Reservation,
    now: DateTime<Utc>,
) -> Result<Resolved, AppError> {
    let taken = retake(tx, &reservation, now).await;
    let event = taken.map_err(|e| {
        error!(
            reservation_id = %reservation.id,
            error = %e,
            "Payment received for released reservation that cannot be reinstated; refund required"
        );
        e
    })?;
    info!(reservation_id = %reservation.id, "Reinstating released reservation after late payment");
    Ok(Resolved::Settle(reservation, event))
}

async fn retake(
    tx: &mut dyn StoreTx,
    reservation: &Reservation,
    now: DateTime<Utc>,
) -> Result<Event, AppError> {
    let hold = ledger::try_reserve(
        tx,
        reservation.event_id,
        reservation.user_id,
        reservation.number_of_tickets,
        now,
    )
    .await?;
    if let Some(promo_id) = reservation.applied_promo_code {
        let promo = tx
            .lock_promo_code(promo_id)
            .await?
            .ok_or(AppError::InvalidOrUsedPromoCode)?;
        promo::claim(tx, reservation.event_id, &promo.code, reservation.user_id, now).await?;
    }
    Ok(hold.event)
}
