//! Payment provider boundary.
//!
//! The booking core opens a checkout session for every pending reservation and
//! later learns the outcome either by asking the provider (`retrieve_session`)
//! or from a signed webhook. Both paths feed the same reconciliation entry
//! point.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::error::AppError;

pub mod offline;
pub mod stripe;
pub mod webhook;

pub use offline::OfflineGateway;
pub use stripe::StripeGateway;

/// Opaque data round-tripped through the provider so a confirmation can be
/// matched to, or used to build, a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutMetadata {
    pub reservation_id: Option<Uuid>,
    pub event_id: Uuid,
    pub user_id: Uuid,
    pub quantity: i32,
    pub promo_code: Option<String>,
}

impl CheckoutMetadata {
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("event_id".to_string(), self.event_id.to_string()),
            ("user_id".to_string(), self.user_id.to_string()),
            ("quantity".to_string(), self.quantity.to_string()),
        ];
        if let Some(id) = self.reservation_id {
            pairs.push(("reservation_id".to_string(), id.to_string()));
        }
        if let Some(code) = &self.promo_code {
            pairs.push(("promo_code".to_string(), code.clone()));
        }
        pairs
    }

    /// Missing or malformed required keys yield `None`; the confirmation is
    /// then matched by reference alone.
    pub fn from_map(map: &HashMap<String, String>) -> Option<Self> {
        let event_id = map.get("event_id")?.parse().ok()?;
        let user_id = map.get("user_id")?.parse().ok()?;
        let quantity = map.get("quantity")?.parse().ok()?;
        let reservation_id = map.get("reservation_id").and_then(|v| v.parse().ok());
        let promo_code = map
            .get("promo_code")
            .filter(|code| !code.trim().is_empty())
            .cloned();
        Some(Self {
            reservation_id,
            event_id,
            user_id,
            quantity,
            promo_code,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub reservation_id: Uuid,
    pub description: String,
    pub amount: Decimal,
    pub metadata: CheckoutMetadata,
}

/// Handed back to the client to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Not paid yet; the customer may still complete it.
    Open,
    Paid,
    Expired,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionDetails {
    pub id: String,
    pub status: SessionStatus,
    pub amount_total: Option<Decimal>,
    pub payment_method: Option<String>,
    pub metadata: Option<CheckoutMetadata>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, AppError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, AppError>;
}
