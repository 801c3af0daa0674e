use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::ledger::{self, Availability};
use super::BookingService;
use crate::models::{Event, NewEvent};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize)]
pub struct EventWithAvailability {
    #[serde(flatten)]
    pub event: Event,
    pub availability: Availability,
}

impl BookingService {
    pub async fn create_event(&self, owner_id: Uuid, new_event: NewEvent) -> Result<Event, AppError> {
        new_event.validate()?;
        let event = new_event.into_event(owner_id, self.clock.now());

        let mut tx = self.store.begin().await?;
        tx.insert_event(&event).await?;
        tx.commit().await?;

        info!(event_id = %event.id, %owner_id, capacity = event.capacity, is_paid = event.is_paid, "Event created");
        Ok(event)
    }

    pub async fn event(&self, event_id: Uuid) -> Result<EventWithAvailability, AppError> {
        let mut tx = self.store.begin().await?;
        let event = tx
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {event_id} not found")))?;
        let availability = ledger::availability(tx.as_mut(), &event).await?;
        Ok(EventWithAvailability {
            event,
            availability,
        })
    }
}
