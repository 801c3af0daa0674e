use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reservation_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Payment required, inventory held.
    Pending,
    /// Inventory committed; payment settled or not required.
    Confirmed,
    /// Inventory released.
    Cancelled,
}

impl ReservationStatus {
    /// Pending and confirmed reservations count against event capacity.
    pub fn holds_inventory(self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Reservation {
    pub id: Uuid,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub number_of_tickets: i32,
    pub total_amount: Decimal,
    pub status: ReservationStatus,
    pub applied_promo_code: Option<Uuid>,
    pub external_payment_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.holds_inventory()
    }
}
