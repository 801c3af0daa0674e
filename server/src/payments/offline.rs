use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{CheckoutRequest, CheckoutSession, PaymentGateway, SessionDetails, SessionStatus};
use crate::utils::error::AppError;

/// Gateway that keeps sessions in memory. Used when no provider key is
/// configured and by tests, which settle sessions with [`OfflineGateway::settle`].
#[derive(Debug, Default)]
pub struct OfflineGateway {
    sessions: Mutex<HashMap<String, SessionDetails>>,
    unavailable: AtomicBool,
}

impl OfflineGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, SessionDetails>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate a provider outage for session creation.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn settle(&self, session_id: &str, status: SessionStatus) -> Option<SessionDetails> {
        let mut sessions = self.sessions();
        let session = sessions.get_mut(session_id)?;
        session.status = status;
        if status == SessionStatus::Paid {
            session.payment_method = Some("card".to_string());
        }
        Some(session.clone())
    }

    pub fn session(&self, session_id: &str) -> Option<SessionDetails> {
        self.sessions().get(session_id).cloned()
    }
}

#[async_trait]
impl PaymentGateway for OfflineGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::ExternalServiceError(
                "payment provider unavailable".to_string(),
            ));
        }

        let id = format!("cs_offline_{}", Uuid::new_v4().simple());
        debug!(session_id = %id, reservation_id = %request.reservation_id, "Offline checkout session opened");
        self.sessions().insert(
            id.clone(),
            SessionDetails {
                id: id.clone(),
                status: SessionStatus::Open,
                amount_total: Some(request.amount),
                payment_method: None,
                metadata: Some(request.metadata),
            },
        );

        Ok(CheckoutSession { id, url: None })
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, AppError> {
        self.session(session_id)
            .ok_or_else(|| AppError::NotFound(format!("checkout session {session_id} not found")))
    }
}
