//! In-memory store for tests and local development.
//!
//! A transaction holds the whole-store lock from `begin` until it is
//! committed or dropped and works on a private copy of the tables, so
//! transactions are fully serialisable and an uncommitted transaction leaves
//! no trace.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{Store, StoreResult, StoreTx};
use crate::models::{
    Event, OrganizerRevenue, Payment, PaymentStatus, PromoCode, Reservation, ReservationStatus,
};
use crate::utils::error::AppError;

#[derive(Debug, Clone, Default)]
struct Tables {
    events: HashMap<Uuid, Event>,
    reservations: HashMap<Uuid, Reservation>,
    promo_codes: HashMap<Uuid, PromoCode>,
    payments: HashMap<Uuid, Payment>,
    revenue: HashMap<Uuid, OrganizerRevenue>,
}

impl Tables {
    fn reference_taken(&self, reference: &str, except: Uuid) -> bool {
        self.reservations.values().any(|r| {
            r.id != except && r.external_payment_reference.as_deref() == Some(reference)
        })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of payment rows recorded for a reservation.
    pub async fn payment_count(&self, reservation_id: Uuid) -> usize {
        let tables = self.tables.lock().await;
        tables
            .payments
            .values()
            .filter(|p| p.reservation_id == reservation_id)
            .count()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(InMemoryTx { guard, working }))
    }
}

pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

fn sorted<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(key);
    rows
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn insert_event(&mut self, event: &Event) -> StoreResult<()> {
        if self.working.events.contains_key(&event.id) {
            return Err(AppError::Conflict(format!("event {} already exists", event.id)));
        }
        self.working.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn get_event(&mut self, event_id: Uuid) -> StoreResult<Option<Event>> {
        Ok(self.working.events.get(&event_id).cloned())
    }

    async fn lock_event(&mut self, event_id: Uuid) -> StoreResult<Option<Event>> {
        self.get_event(event_id).await
    }

    async fn held_tickets(&mut self, event_id: Uuid) -> StoreResult<i64> {
        Ok(self
            .working
            .reservations
            .values()
            .filter(|r| r.event_id == event_id && r.is_active())
            .map(|r| i64::from(r.number_of_tickets))
            .sum())
    }

    async fn has_active_reservation(
        &mut self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<bool> {
        Ok(self
            .working
            .reservations
            .values()
            .any(|r| r.event_id == event_id && r.user_id == user_id && r.is_active()))
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        if let Some(reference) = &reservation.external_payment_reference {
            if self.working.reference_taken(reference, reservation.id) {
                return Err(AppError::Conflict(format!(
                    "payment reference {reference} already used"
                )));
            }
        }
        self.working
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn get_reservation(&mut self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        Ok(self.working.reservations.get(&reservation_id).cloned())
    }

    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> StoreResult<Option<Reservation>> {
        self.get_reservation(reservation_id).await
    }

    async fn lock_reservation_by_reference(
        &mut self,
        external_reference: &str,
    ) -> StoreResult<Option<Reservation>> {
        Ok(self
            .working
            .reservations
            .values()
            .find(|r| r.external_payment_reference.as_deref() == Some(external_reference))
            .cloned())
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        if let Some(reference) = &reservation.external_payment_reference {
            if self.working.reference_taken(reference, reservation.id) {
                return Err(AppError::Conflict(format!(
                    "payment reference {reference} already used"
                )));
            }
        }
        match self.working.reservations.get_mut(&reservation.id) {
            Some(existing) => {
                *existing = reservation.clone();
                Ok(())
            }
            None => Err(AppError::NotFound(format!(
                "reservation {} not found",
                reservation.id
            ))),
        }
    }

    async fn list_user_reservations(&mut self, user_id: Uuid) -> StoreResult<Vec<Reservation>> {
        let rows = self
            .working
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        Ok(sorted(rows, |r: &Reservation| std::cmp::Reverse(r.created_at)))
    }

    async fn lock_abandoned_reservations(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Reservation>> {
        let rows = self
            .working
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Pending && r.created_at < cutoff)
            .cloned()
            .collect();
        let mut rows = sorted(rows, |r: &Reservation| r.created_at);
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn insert_promo_code(&mut self, promo: &PromoCode) -> StoreResult<bool> {
        let taken = self
            .working
            .promo_codes
            .values()
            .any(|p| p.event_id == promo.event_id && p.code == promo.code);
        if taken {
            return Ok(false);
        }
        self.working.promo_codes.insert(promo.id, promo.clone());
        Ok(true)
    }

    async fn claim_promo_code(
        &mut self,
        event_id: Uuid,
        code: &str,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PromoCode>> {
        let promo = self
            .working
            .promo_codes
            .values_mut()
            .find(|p| p.event_id == event_id && p.code == code && !p.used);
        Ok(promo.map(|p| {
            p.used = true;
            p.used_by = Some(user_id);
            p.used_at = Some(at);
            p.clone()
        }))
    }

    async fn lock_promo_code(&mut self, promo_id: Uuid) -> StoreResult<Option<PromoCode>> {
        Ok(self.working.promo_codes.get(&promo_id).cloned())
    }

    async fn update_promo_code(&mut self, promo: &PromoCode) -> StoreResult<()> {
        self.working.promo_codes.insert(promo.id, promo.clone());
        Ok(())
    }

    async fn list_promo_codes(&mut self, event_id: Uuid) -> StoreResult<Vec<PromoCode>> {
        let rows = self
            .working
            .promo_codes
            .values()
            .filter(|p| p.event_id == event_id)
            .cloned()
            .collect();
        Ok(sorted(rows, |p: &PromoCode| (p.created_at, p.code.clone())))
    }

    async fn payment_for_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> StoreResult<Option<Payment>> {
        Ok(self
            .working
            .payments
            .values()
            .find(|p| p.reservation_id == reservation_id)
            .cloned())
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        let duplicate = self.working.payments.values().any(|p| {
            p.reservation_id == payment.reservation_id
                || p.external_reference == payment.external_reference
        });
        if duplicate {
            return Err(AppError::Conflict(format!(
                "payment for reservation {} already recorded",
                payment.reservation_id
            )));
        }
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        self.working.payments.insert(payment.id, payment.clone());
        Ok(())
    }

    async fn lock_revenue(&mut self, _owner_id: Uuid) -> StoreResult<()> {
        Ok(())
    }

    async fn confirmed_revenue(&mut self, owner_id: Uuid) -> StoreResult<Decimal> {
        let tables = &self.working;
        let total = tables
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Confirmed)
            .filter_map(|r| {
                let event = tables.events.get(&r.event_id)?;
                if event.owner_id != owner_id {
                    return None;
                }
                let settled = !event.is_paid
                    || tables.payments.values().any(|p| {
                        p.reservation_id == r.id && p.status == PaymentStatus::Paid
                    });
                settled.then_some(r.total_amount)
            })
            .sum();
        Ok(total)
    }

    async fn store_revenue(
        &mut self,
        owner_id: Uuid,
        total: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.working.revenue.insert(
            owner_id,
            OrganizerRevenue {
                owner_id,
                total_revenue: total,
                updated_at: at,
            },
        );
        Ok(())
    }

    async fn get_revenue(&mut self, owner_id: Uuid) -> StoreResult<Option<OrganizerRevenue>> {
        Ok(self.working.revenue.get(&owner_id).cloned())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let InMemoryTx { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(capacity: i32) -> Event {
        let now = Utc::now();
        Event {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            title: "Launch party".into(),
            capacity,
            price: None,
            is_paid: false,
            is_online: false,
            start_time: now,
            end_time: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn test_uncommitted_transaction_is_discarded() {
        let store = InMemoryStore::new();
        let event = event(5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_event(&event).await.unwrap();
        drop(tx);

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_event(event.id).await.unwrap().is_none());
        tx.insert_event(&event).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.get_event(event.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_claim_is_conditional_on_unused() {
        let store = InMemoryStore::new();
        let event = event(5);
        let now = Utc::now();
        let promo = PromoCode {
            id: Uuid::new_v4(),
            event_id: event.id,
            code: "SPRING".into(),
            discount_percent: 10,
            used: false,
            used_by: None,
            used_at: None,
            created_at: now,
        };

        let mut tx = store.begin().await.unwrap();
        assert!(tx.insert_promo_code(&promo).await.unwrap());
        assert!(!tx.insert_promo_code(&promo).await.unwrap());

        let first = tx
            .claim_promo_code(event.id, "SPRING", Uuid::new_v4(), now)
            .await
            .unwrap();
        assert!(first.is_some_and(|p| p.used));
        let second = tx
            .claim_promo_code(event.id, "SPRING", Uuid::new_v4(), now)
            .await
            .unwrap();
        assert!(second.is_none());
    }
}
