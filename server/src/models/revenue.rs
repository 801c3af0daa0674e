use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Derived total; written only by the revenue aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OrganizerRevenue {
    pub owner_id: Uuid,
    pub total_revenue: Decimal,
    pub updated_at: DateTime<Utc>,
}
