use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

pub const MAX_DISCOUNT_PERCENT: i32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PromoCode {
    pub id: Uuid,
    pub event_id: Uuid,
    /// Unique per event, stored upper-case.
    pub code: String,
    pub discount_percent: i32,
    pub used: bool,
    pub used_by: Option<Uuid>,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Enforced both when codes are issued and when they are claimed.
pub fn validate_discount(discount_percent: i32) -> Result<(), AppError> {
    if (0..=MAX_DISCOUNT_PERCENT).contains(&discount_percent) {
        Ok(())
    } else {
        Err(AppError::ValidationError(format!(
            "discount_percent must be between 0 and {MAX_DISCOUNT_PERCENT}, got {discount_percent}"
        )))
    }
}

/// Codes are matched case-insensitively and without surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_bounds() {
        assert!(validate_discount(0).is_ok());
        assert!(validate_discount(100).is_ok());
        assert!(validate_discount(-1).is_err());
        assert!(validate_discount(101).is_err());
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  summer10 "), "SUMMER10");
    }
}
