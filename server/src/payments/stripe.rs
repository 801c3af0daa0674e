//! Stripe-compatible checkout client.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use super::{
    CheckoutMetadata, CheckoutRequest, CheckoutSession, PaymentGateway, SessionDetails,
    SessionStatus,
};
use crate::config::PaymentsConfig;
use crate::models::money::{from_minor_units, to_minor_units};
use crate::utils::error::AppError;

/// Checkout session as returned by the API and embedded in webhook events.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub status: Option<String>,
    pub payment_status: Option<String>,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub url: Option<String>,
    #[serde(default)]
    pub payment_method_types: Vec<String>,
}

impl CheckoutSessionObject {
    pub fn session_status(&self) -> SessionStatus {
        match (self.status.as_deref(), self.payment_status.as_deref()) {
            (Some("expired"), _) => SessionStatus::Expired,
            (Some("complete"), Some("paid" | "no_payment_required")) => SessionStatus::Paid,
            _ => SessionStatus::Open,
        }
    }

    pub fn into_details(self) -> SessionDetails {
        let status = self.session_status();
        SessionDetails {
            status,
            amount_total: self.amount_total.map(from_minor_units),
            payment_method: self.payment_method_types.into_iter().next(),
            metadata: CheckoutMetadata::from_map(&self.metadata),
            id: self.id,
        }
    }
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SESSION_ID_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    api_key: String,
    api_base: String,
    success_url: String,
    cancel_url: String,
    currency: String,
}

impl StripeGateway {
    pub fn new(api_key: String, config: &PaymentsConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            currency: config.currency.to_ascii_lowercase(),
        }
    }

    /// The provider substitutes the session id into the return URL.
    fn success_url(&self) -> String {
        if self.success_url.contains(SESSION_ID_PLACEHOLDER) {
            return self.success_url.clone();
        }
        let separator = if self.success_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}session_id={SESSION_ID_PLACEHOLDER}", self.success_url)
    }

    fn session_form(&self, request: &CheckoutRequest) -> Result<Vec<(String, String)>, AppError> {
        let unit_amount = to_minor_units(request.amount).ok_or_else(|| {
            AppError::ValidationError(format!("amount {} out of range", request.amount))
        })?;

        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.success_url()),
            ("cancel_url".to_string(), self.cancel_url.clone()),
            (
                "client_reference_id".to_string(),
                request.reservation_id.to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                unit_amount.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.description.clone(),
            ),
        ];
        form.extend(
            request
                .metadata
                .to_pairs()
                .into_iter()
                .map(|(key, value)| (format!("metadata[{key}]"), value)),
        );
        Ok(form)
    }

    async fn read_session(response: reqwest::Response) -> Result<CheckoutSessionObject, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Payment provider rejected request");
            return Err(AppError::ExternalServiceError(format!(
                "payment provider returned {status}"
            )));
        }
        response
            .json::<CheckoutSessionObject>()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("malformed provider response: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        let form = self.session_form(&request)?;
        let response = self
            .client
            .post(format!("{}/checkout/sessions", self.api_base))
            .bearer_auth(&self.api_key)
            .header("Idempotency-Key", request.reservation_id.to_string())
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("payment provider unreachable: {e}")))?;

        let session = Self::read_session(response).await?;
        debug!(session_id = %session.id, reservation_id = %request.reservation_id, "Checkout session created");
        Ok(CheckoutSession {
            id: session.id,
            url: session.url,
        })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, AppError> {
        let response = self
            .client
            .get(format!("{}/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("payment provider unreachable: {e}")))?;

        Ok(Self::read_session(response).await?.into_details())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn session(status: &str, payment_status: &str) -> CheckoutSessionObject {
        serde_json::from_value(serde_json::json!({
            "id": "cs_test_1",
            "status": status,
            "payment_status": payment_status,
            "amount_total": 5400,
            "metadata": {
                "event_id": Uuid::nil().to_string(),
                "user_id": Uuid::nil().to_string(),
                "quantity": "3"
            },
            "payment_method_types": ["card"]
        }))
        .unwrap()
    }

    #[test]
    fn test_session_status_mapping() {
        assert_eq!(session("complete", "paid").session_status(), SessionStatus::Paid);
        assert_eq!(session("complete", "unpaid").session_status(), SessionStatus::Open);
        assert_eq!(session("open", "unpaid").session_status(), SessionStatus::Open);
        assert_eq!(session("expired", "unpaid").session_status(), SessionStatus::Expired);
    }

    #[test]
    fn test_into_details_converts_minor_units() {
        let details = session("complete", "paid").into_details();
        assert_eq!(details.amount_total, Some(Decimal::new(5400, 2)));
        assert_eq!(details.payment_method.as_deref(), Some("card"));
        assert_eq!(details.metadata.map(|m| m.quantity), Some(3));
    }

    #[test]
    fn test_session_form_encodes_amount_and_metadata() {
        let gateway = StripeGateway::new("sk_test".into(), &PaymentsConfig::default());
        let request = CheckoutRequest {
            reservation_id: Uuid::new_v4(),
            description: "Rust meetup x3".into(),
            amount: Decimal::new(5400, 2),
            metadata: CheckoutMetadata {
                reservation_id: None,
                event_id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                quantity: 3,
                promo_code: None,
            },
        };
        let form: HashMap<String, String> =
            gateway.session_form(&request).unwrap().into_iter().collect();
        assert_eq!(form["line_items[0][price_data][unit_amount]"], "5400");
        assert_eq!(form["metadata[quantity]"], "3");
        assert_eq!(form["client_reference_id"], request.reservation_id.to_string());
        assert_eq!(
            form["success_url"],
            "http://localhost:3000/checkout/success?session_id={CHECKOUT_SESSION_ID}"
        );
    }

    #[test]
    fn test_success_url_carries_session_id_once() {
        let mut config = PaymentsConfig::default();
        for (configured, expected) in [
            (
                "https://shop.test/done?session_id={CHECKOUT_SESSION_ID}",
                "https://shop.test/done?session_id={CHECKOUT_SESSION_ID}",
            ),
            (
                "https://shop.test/done?lang=en",
                "https://shop.test/done?lang=en&session_id={CHECKOUT_SESSION_ID}",
            ),
            (
                "https://shop.test/done",
                "https://shop.test/done?session_id={CHECKOUT_SESSION_ID}",
            ),
        ] {
            config.success_url = configured.to_string();
            let gateway = StripeGateway::new("sk_test".into(), &config);
            assert_eq!(gateway.success_url(), expected);
            assert_eq!(gateway.success_url().matches("session_id=").count(), 1);
        }
    }
}
