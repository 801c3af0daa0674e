//! Inventory ledger.
//!
//! Remaining capacity is derived, never stored: `capacity` minus the tickets
//! of pending and confirmed reservations. A reservation therefore holds
//! inventory exactly while its status is pending or confirmed, and releasing
//! inventory is a change to the reservation row made in the same transaction
//! that decided it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Event, Reservation, ReservationStatus};
use crate::store::StoreTx;
use crate::utils::error::AppError;

/// Capacity granted to a reservation about to be inserted in the same
/// transaction.
#[derive(Debug, Clone)]
pub struct Hold {
    pub event: Event,
    /// Tickets left once this hold is written.
    pub remaining: i64,
}

/// Locks the event row, then checks that the event is still running, the
/// online-event rules, and capacity.
///
/// The lock is held until the caller's transaction ends, so the check and the
/// reservation insert that follows cannot interleave with another caller for
/// the same event.
pub async fn try_reserve(
    tx: &mut dyn StoreTx,
    event_id: Uuid,
    user_id: Uuid,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<Hold, AppError> {
    if quantity < 1 {
        return Err(AppError::InvalidQuantity(
            "at least one ticket is required".to_string(),
        ));
    }

    let event = tx
        .lock_event(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("event {event_id} not found")))?;

    if event.has_ended(now) {
        return Err(AppError::EventEnded);
    }

    if event.is_online {
        if quantity != 1 {
            return Err(AppError::InvalidQuantity(
                "online events admit exactly one ticket per user".to_string(),
            ));
        }
        if tx.has_active_reservation(event_id, user_id).await? {
            return Err(AppError::DuplicateReservation);
        }
    }

    let available = availability(tx, &event).await?.remaining;
    let requested = i64::from(quantity);
    if requested > available {
        return Err(AppError::InsufficientCapacity {
            requested: quantity,
            remaining: available,
        });
    }

    Ok(Hold {
        remaining: available - requested,
        event,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub capacity: i32,
    pub held: i64,
    pub remaining: i64,
}

pub async fn availability(tx: &mut dyn StoreTx, event: &Event) -> Result<Availability, AppError> {
    let held = tx.held_tickets(event.id).await?;
    Ok(Availability {
        capacity: event.capacity,
        held,
        remaining: (i64::from(event.capacity) - held).max(0),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Every ticket returned; the reservation no longer holds inventory.
    Full,
    Partial { remaining_tickets: i32 },
}

/// Returns `quantity` tickets of `reservation` to the pool.
pub fn release(
    reservation: &mut Reservation,
    quantity: i32,
    now: DateTime<Utc>,
) -> Result<Release, AppError> {
    if !reservation.is_active() {
        return Err(AppError::ReservationNotActive);
    }
    if quantity < 1 || quantity > reservation.number_of_tickets {
        return Err(AppError::InvalidQuantity(format!(
            "can release between 1 and {} tickets, got {quantity}",
            reservation.number_of_tickets
        )));
    }

    reservation.updated_at = now;
    if quantity == reservation.number_of_tickets {
        reservation.status = ReservationStatus::Cancelled;
        Ok(Release::Full)
    } else {
        reservation.number_of_tickets -= quantity;
        Ok(Release::Partial {
            remaining_tickets: reservation.number_of_tickets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn reservation(tickets: i32) -> Reservation {
        let now = Utc::now();
        Reservation {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            number_of_tickets: tickets,
            total_amount: Decimal::new(10000, 2),
            status: ReservationStatus::Confirmed,
            applied_promo_code: None,
            external_payment_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_partial_release_keeps_status() {
        let mut r = reservation(5);
        let outcome = release(&mut r, 2, Utc::now()).unwrap();
        assert_eq!(outcome, Release::Partial { remaining_tickets: 3 });
        assert_eq!(r.status, ReservationStatus::Confirmed);
        assert_eq!(r.number_of_tickets, 3);
    }

    #[test]
    fn test_full_release_cancels() {
        let mut r = reservation(2);
        assert_eq!(release(&mut r, 2, Utc::now()).unwrap(), Release::Full);
        assert_eq!(r.status, ReservationStatus::Cancelled);
        // Count retained for audit
        assert_eq!(r.number_of_tickets, 2);
        assert!(matches!(
            release(&mut r, 1, Utc::now()),
            Err(AppError::ReservationNotActive)
        ));
    }

    #[test]
    fn test_release_bounds() {
        let mut r = reservation(2);
        assert!(matches!(
            release(&mut r, 3, Utc::now()),
            Err(AppError::InvalidQuantity(_))
        ));
        assert!(matches!(
            release(&mut r, 0, Utc::now()),
            Err(AppError::InvalidQuantity(_))
        ));
        assert_eq!(r.number_of_tickets, 2);
    }
}
