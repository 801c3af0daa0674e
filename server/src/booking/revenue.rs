//! Revenue aggregator.
//!
//! An organizer's revenue is the sum of `total_amount` over confirmed
//! reservations that are settled: backed by a paid payment, or belonging to a
//! free event. It is recomputed from scratch inside every transaction that
//! changes a reservation's paid or confirmed state, after taking the
//! per-owner revenue lock, so concurrent recomputes serialise and the last
//! writer always sees every committed change.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;
use uuid::Uuid;

use super::BookingService;
use crate::models::money::round_money;
use crate::models::OrganizerRevenue;
use crate::store::StoreTx;
use crate::utils::error::AppError;

pub async fn recompute_in(
    tx: &mut dyn StoreTx,
    owner_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Decimal, AppError> {
    tx.lock_revenue(owner_id).await?;
    let total = round_money(tx.confirmed_revenue(owner_id).await?);
    tx.store_revenue(owner_id, total, now).await?;
    debug!(%owner_id, %total, "Organizer revenue recomputed");
    Ok(total)
}

impl BookingService {
    pub async fn recompute_revenue(&self, owner_id: Uuid) -> Result<Decimal, AppError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let total = recompute_in(tx.as_mut(), owner_id, now).await?;
        tx.commit().await?;
        Ok(total)
    }

    /// Stored revenue; zero for organizers with no settled reservations yet.
    pub async fn revenue(&self, owner_id: Uuid) -> Result<OrganizerRevenue, AppError> {
        let mut tx = self.store.begin().await?;
        let revenue = tx.get_revenue(owner_id).await?;
        Ok(revenue.unwrap_or_else(|| OrganizerRevenue {
            owner_id,
            total_revenue: round_money(Decimal::ZERO),
            updated_at: self.clock.now(),
        }))
    }
}
