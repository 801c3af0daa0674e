//! Fire-and-forget notifications about reservation changes.
//!
//! Notifications are dispatched after the owning transaction commits. A
//! delivery failure is logged and never affects the reservation.

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ReservationConfirmed,
    ReservationCancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: Uuid,
    pub event_title: String,
    pub quantity: i32,
    pub amount: Decimal,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), AppError>;
}

/// Writes notifications to the log; the default until a mail/SMS relay is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> Result<(), AppError> {
        info!(
            kind = ?notification.kind,
            recipient = %notification.recipient,
            event_title = %notification.event_title,
            quantity = notification.quantity,
            amount = %notification.amount,
            "Notification dispatched"
        );
        Ok(())
    }
}

pub fn dispatch(notifier: &Arc<dyn Notifier>, notification: Notification) {
    let notifier = Arc::clone(notifier);
    tokio::spawn(async move {
        let kind = notification.kind;
        let recipient = notification.recipient;
        if let Err(e) = notifier.send(notification).await {
            warn!(error = %e, ?kind, %recipient, "Notification delivery failed");
        }
    });
}
