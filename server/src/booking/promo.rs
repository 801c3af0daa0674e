//! Promo code registry.

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use super::BookingService;
use crate::models::promo_code::{normalize_code, validate_discount};
use crate::models::PromoCode;
use crate::store::StoreTx;
use crate::utils::error::AppError;

/// No 0/O or 1/I, so codes survive being read aloud or retyped.
const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LENGTH: usize = 10;
pub const MAX_CODES_PER_ISSUE: i32 = 500;
const MAX_COLLISIONS: usize = 16;

pub fn generate_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Atomically marks `code` used by `user_id` and returns it.
///
/// Concurrent claims of the same code race on a single conditional update;
/// exactly one of them gets the row back.
pub async fn claim(
    tx: &mut dyn StoreTx,
    event_id: Uuid,
    code: &str,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<PromoCode, AppError> {
    let code = normalize_code(code);
    if code.is_empty() {
        return Err(AppError::InvalidOrUsedPromoCode);
    }
    let promo = tx
        .claim_promo_code(event_id, &code, user_id, now)
        .await?
        .ok_or(AppError::InvalidOrUsedPromoCode)?;
    // Out-of-range rows predate the write-time check; the claim rolls back with the tx
    validate_discount(promo.discount_percent)?;
    Ok(promo)
}

/// Records the redemption once the funded reservation is paid. A no-op when
/// the claim at booking time already did so. Fails when another user holds
/// the code.
pub async fn finalize(
    tx: &mut dyn StoreTx,
    promo_id: Uuid,
    user_id: Uuid,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    let Some(mut promo) = tx.lock_promo_code(promo_id).await? else {
        warn!(%promo_id, "Applied promo code no longer exists");
        return Err(AppError::InvalidOrUsedPromoCode);
    };
    if promo.used {
        if promo.used_by != Some(user_id) {
            warn!(%promo_id, %user_id, used_by = ?promo.used_by, "Promo code redeemed by another user");
            return Err(AppError::InvalidOrUsedPromoCode);
        }
        return Ok(());
    }
    promo.used = true;
    promo.used_by = Some(user_id);
    promo.used_at = Some(now);
    tx.update_promo_code(&promo).await
}

/// Gives a claim back when the reservation it funded was never paid.
pub async fn release_claim(tx: &mut dyn StoreTx, promo_id: Uuid) -> Result<(), AppError> {
    let Some(mut promo) = tx.lock_promo_code(promo_id).await? else {
        return Ok(());
    };
    if !promo.used {
        return Ok(());
    }
    promo.used = false;
    promo.used_by = None;
    promo.used_at = None;
    tx.update_promo_code(&promo).await
}

impl BookingService {
    pub async fn issue_promo_codes(
        &self,
        owner_id: Uuid,
        event_id: Uuid,
        quantity: i32,
        discount_percent: i32,
    ) -> Result<Vec<PromoCode>, AppError> {
        validate_discount(discount_percent)?;
        if !(1..=MAX_CODES_PER_ISSUE).contains(&quantity) {
            return Err(AppError::InvalidQuantity(format!(
                "between 1 and {MAX_CODES_PER_ISSUE} codes may be issued at once"
            )));
        }

        let now = self.clock.now();
        let mut tx = self.store.begin().await?;
        let event = tx
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {event_id} not found")))?;
        if event.owner_id != owner_id {
            return Err(AppError::Forbidden(
                "only the event owner may issue promo codes".to_string(),
            ));
        }

        let mut issued = Vec::with_capacity(quantity as usize);
        let mut collisions = 0;
        while issued.len() < quantity as usize {
            let promo = PromoCode {
                id: Uuid::new_v4(),
                event_id,
                code: generate_code(),
                discount_percent,
                used: false,
                used_by: None,
                used_at: None,
                created_at: now,
            };
            if tx.insert_promo_code(&promo).await? {
                issued.push(promo);
            } else {
                collisions += 1;
                if collisions > MAX_COLLISIONS {
                    return Err(AppError::InternalServerError(
                        "could not generate unique promo codes".to_string(),
                    ));
                }
            }
        }
        tx.commit().await?;

        info!(%event_id, count = issued.len(), discount_percent, "Promo codes issued");
        Ok(issued)
    }

    pub async fn list_promo_codes(
        &self,
        owner_id: Uuid,
        event_id: Uuid,
    ) -> Result<Vec<PromoCode>, AppError> {
        let mut tx = self.store.begin().await?;
        let event = tx
            .get_event(event_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("event {event_id} not found")))?;
        if event.owner_id != owner_id {
            return Err(AppError::Forbidden(
                "only the event owner may list promo codes".to_string(),
            ));
        }
        tx.list_promo_codes(event_id).await
    }
}
