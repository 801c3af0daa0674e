use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "payment_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    /// Fully refunded after the reservation was cancelled.
    Refunded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub reservation_id: Uuid,
    pub external_reference: String,
    pub amount: Decimal,
    /// Running total of refunds owed from partial and full cancellations.
    pub refunded_amount: Decimal,
    pub method: String,
    pub status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
}
