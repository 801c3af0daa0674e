use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    /// Immutable ceiling on tickets held by pending and confirmed reservations.
    pub capacity: i32,
    /// `None` for free events.
    pub price: Option<Decimal>,
    pub is_paid: bool,
    /// Single-admission events: one ticket per user.
    pub is_online: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    pub fn unit_price(&self) -> Decimal {
        if self.is_paid {
            self.price.unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub capacity: i32,
    pub price: Option<Decimal>,
    pub is_paid: bool,
    #[serde(default)]
    pub is_online: bool,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl NewEvent {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::ValidationError("title must not be empty".into()));
        }
        if self.capacity < 0 {
            return Err(AppError::ValidationError(
                "capacity must not be negative".into(),
            ));
        }
        match (self.is_paid, self.price) {
            (true, None) => {
                return Err(AppError::ValidationError(
                    "paid events require a price".into(),
                ))
            }
            (false, Some(_)) => {
                return Err(AppError::ValidationError(
                    "free events must not carry a price".into(),
                ))
            }
            (true, Some(price)) if price.is_sign_negative() => {
                return Err(AppError::ValidationError(
                    "price must not be negative".into(),
                ))
            }
            _ => {}
        }
        if self.end_time < self.start_time {
            return Err(AppError::ValidationError(
                "end_time must not precede start_time".into(),
            ));
        }
        Ok(())
    }

    pub fn into_event(self, owner_id: Uuid, now: DateTime<Utc>) -> Event {
        Event {
            id: Uuid::new_v4(),
            owner_id,
            title: self.title.trim().to_string(),
            capacity: self.capacity,
            price: self.price.map(crate::models::money::round_money),
            is_paid: self.is_paid,
            is_online: self.is_online,
            start_time: self.start_time,
            end_time: self.end_time,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn paid(price: Option<Decimal>) -> NewEvent {
        let start = Utc::now() + Duration::days(3);
        NewEvent {
            title: "Rust meetup".into(),
            capacity: 10,
            price,
            is_paid: true,
            is_online: false,
            start_time: start,
            end_time: start + Duration::hours(2),
        }
    }

    #[test]
    fn test_price_required_iff_paid() {
        assert!(paid(Some(Decimal::new(2000, 2))).validate().is_ok());
        assert!(paid(None).validate().is_err());

        let mut free = paid(Some(Decimal::ONE));
        free.is_paid = false;
        assert!(free.validate().is_err());
        free.price = None;
        assert!(free.validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_capacity_and_inverted_times() {
        let mut event = paid(Some(Decimal::ONE));
        event.capacity = -1;
        assert!(event.validate().is_err());

        let mut event = paid(Some(Decimal::ONE));
        event.end_time = event.start_time - Duration::minutes(1);
        assert!(event.validate().is_err());
    }

    #[test]
    fn test_free_event_unit_price_is_zero() {
        let mut new_event = paid(None);
        new_event.is_paid = false;
        let event = new_event.into_event(Uuid::new_v4(), Utc::now());
        assert_eq!(event.unit_price(), Decimal::ZERO);
        assert!(!event.has_ended(event.start_time));
        assert!(event.has_ended(event.end_time));
    }
}
