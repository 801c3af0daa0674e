//! Reservation, promo code, payment reconciliation and revenue logic.
//!
//! [`BookingService`] is the only writer of reservation, promo code, payment
//! and revenue state. Each public operation opens one store transaction,
//! performs all checks and writes inside it, commits, and only then talks to
//! the outside world (payment provider, notifier).

use std::sync::Arc;

use chrono::Duration;

use crate::notify::Notifier;
use crate::payments::PaymentGateway;
use crate::store::Store;

pub mod clock;
pub mod events;
pub mod ledger;
pub mod promo;
pub mod reaper;
pub mod reconciliation;
pub mod reservations;
pub mod revenue;

pub use clock::{Clock, ManualClock, SystemClock};

#[derive(Debug, Clone)]
pub struct BookingPolicy {
    /// Age after which an unpaid pending reservation is released.
    pub hold_ttl: Duration,
    /// Cancellations are refused this close to the event start.
    pub cancellation_window: Duration,
    pub max_tickets_per_reservation: i32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::minutes(30),
            cancellation_window: Duration::hours(24),
            max_tickets_per_reservation: 10,
        }
    }
}

pub struct BookingService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    policy: BookingPolicy,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        policy: BookingPolicy,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            clock,
            policy,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}
