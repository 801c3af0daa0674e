//! Releases pending reservations whose checkout was abandoned.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::reservations::abandon_in;
use super::BookingService;
use crate::models::Reservation;
use crate::notify::NotificationKind;
use crate::utils::error::AppError;

const BATCH_SIZE: i64 = 100;

impl BookingService {
    /// One sweep: cancels up to one batch of pending reservations older than
    /// the hold TTL.
    pub async fn expire_abandoned(&self) -> Result<Vec<Reservation>, AppError> {
        let now = self.clock.now();
        let cutoff = now - self.policy.hold_ttl;
        let mut tx = self.store.begin().await?;

        let mut expired = tx.lock_abandoned_reservations(cutoff, BATCH_SIZE).await?;
        let mut events = Vec::with_capacity(expired.len());
        for reservation in expired.iter_mut() {
            abandon_in(tx.as_mut(), reservation, now).await?;
            events.push(tx.get_event(reservation.event_id).await?);
        }
        tx.commit().await?;

        for (reservation, event) in expired.iter().zip(&events) {
            info!(
                reservation_id = %reservation.id,
                event_id = %reservation.event_id,
                tickets = reservation.number_of_tickets,
                "Expired unpaid reservation"
            );
            if let Some(event) = event {
                self.notify(
                    NotificationKind::ReservationCancelled,
                    reservation,
                    event,
                    Decimal::ZERO,
                );
            }
        }
        Ok(expired)
    }
}

pub fn spawn_reaper(service: Arc<BookingService>, every: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match service.expire_abandoned().await {
                Ok(expired) if !expired.is_empty() => {
                    info!(count = expired.len(), "Reaper released abandoned holds");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Reaper sweep failed"),
            }
        }
    })
}
