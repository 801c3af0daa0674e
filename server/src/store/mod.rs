//! Storage access for the booking core.
//!
//! Every read-check-write sequence in the core runs inside one [`StoreTx`].
//! Dropping a transaction without calling [`StoreTx::commit`] rolls it back,
//! so an early `?` return never leaves a half-applied booking behind.
//!
//! Methods prefixed `lock_` take a row lock that is held until the
//! transaction ends. The inventory ledger relies on [`StoreTx::lock_event`]
//! to serialise capacity checks per event, and the promo registry relies on
//! [`StoreTx::claim_promo_code`] being a single conditional update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::models::{Event, OrganizerRevenue, Payment, PromoCode, Reservation};
use crate::utils::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, AppError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>>;
}

#[async_trait]
pub trait StoreTx: Send {
    async fn insert_event(&mut self, event: &Event) -> StoreResult<()>;
    async fn get_event(&mut self, event_id: Uuid) -> StoreResult<Option<Event>>;
    async fn lock_event(&mut self, event_id: Uuid) -> StoreResult<Option<Event>>;

    /// Tickets held by pending and confirmed reservations.
    async fn held_tickets(&mut self, event_id: Uuid) -> StoreResult<i64>;
    async fn has_active_reservation(&mut self, event_id: Uuid, user_id: Uuid)
        -> StoreResult<bool>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;
    async fn get_reservation(&mut self, reservation_id: Uuid) -> StoreResult<Option<Reservation>>;
    async fn lock_reservation(&mut self, reservation_id: Uuid)
        -> StoreResult<Option<Reservation>>;
    async fn lock_reservation_by_reference(
        &mut self,
        external_reference: &str,
    ) -> StoreResult<Option<Reservation>>;
    async fn update_reservation(&mut self, reservation: &Reservation) -> StoreResult<()>;
    async fn list_user_reservations(&mut self, user_id: Uuid) -> StoreResult<Vec<Reservation>>;
    /// Pending reservations created before `cutoff`, skipping rows another
    /// transaction already holds.
    async fn lock_abandoned_reservations(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Reservation>>;

    /// Returns `false` when `(event_id, code)` is already taken.
    async fn insert_promo_code(&mut self, promo: &PromoCode) -> StoreResult<bool>;
    /// Marks an unused code as used and returns it; `None` when the code does
    /// not exist for the event or was already used.
    async fn claim_promo_code(
        &mut self,
        event_id: Uuid,
        code: &str,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PromoCode>>;
    async fn lock_promo_code(&mut self, promo_id: Uuid) -> StoreResult<Option<PromoCode>>;
    async fn update_promo_code(&mut self, promo: &PromoCode) -> StoreResult<()>;
    async fn list_promo_codes(&mut self, event_id: Uuid) -> StoreResult<Vec<PromoCode>>;

    async fn payment_for_reservation(&mut self, reservation_id: Uuid)
        -> StoreResult<Option<Payment>>;
    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()>;
    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()>;

    /// Serialises revenue recomputation per owner.
    async fn lock_revenue(&mut self, owner_id: Uuid) -> StoreResult<()>;
    async fn confirmed_revenue(&mut self, owner_id: Uuid) -> StoreResult<Decimal>;
    async fn store_revenue(
        &mut self,
        owner_id: Uuid,
        total: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn get_revenue(&mut self, owner_id: Uuid) -> StoreResult<Option<OrganizerRevenue>>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
