//! PostgreSQL store.
//!
//! Capacity checks serialise on `SELECT ... FOR UPDATE` of the event row;
//! promo claims are a single conditional `UPDATE ... WHERE used = FALSE`.
//! Unique constraints on `payments.reservation_id`,
//! `payments.external_reference` and `reservations.external_payment_reference`
//! back the exactly-once guarantees of payment reconciliation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, Transaction};
use uuid::Uuid;

use super::{Store, StoreResult, StoreTx};
use crate::models::{Event, OrganizerRevenue, Payment, PromoCode, Reservation};

const EVENT_COLUMNS: &str = "id, owner_id, title, capacity, price, is_paid, is_online, \
     start_time, end_time, created_at";

const RESERVATION_COLUMNS: &str = "id, event_id, user_id, number_of_tickets, total_amount, \
     status, applied_promo_code, external_payment_reference, created_at, updated_at";

const PROMO_COLUMNS: &str =
    "id, event_id, code, discount_percent, used, used_by, used_at, created_at";

const PAYMENT_COLUMNS: &str =
    "id, reservation_id, external_reference, amount, refunded_amount, method, status, paid_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!().run(&self.pool).await
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> StoreResult<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx { tx }))
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn insert_event(&mut self, event: &Event) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, owner_id, title, capacity, price, is_paid, is_online,
                                start_time, end_time, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(event.owner_id)
        .bind(&event.title)
        .bind(event.capacity)
        .bind(event.price)
        .bind(event.is_paid)
        .bind(event.is_online)
        .bind(event.start_time)
        .bind(event.end_time)
        .bind(event.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_event(&mut self, event_id: Uuid) -> StoreResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1");
        let event = sqlx::query_as::<_, Event>(&sql)
            .bind(event_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(event)
    }

    async fn lock_event(&mut self, event_id: Uuid) -> StoreResult<Option<Event>> {
        let sql = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE");
        let event = sqlx::query_as::<_, Event>(&sql)
            .bind(event_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(event)
    }

    async fn held_tickets(&mut self, event_id: Uuid) -> StoreResult<i64> {
        let held: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(number_of_tickets), 0)::BIGINT
            FROM reservations
            WHERE event_id = $1 AND status IN ('pending', 'confirmed')
            "#,
        )
        .bind(event_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(held)
    }

    async fn has_active_reservation(
        &mut self,
        event_id: Uuid,
        user_id: Uuid,
    ) -> StoreResult<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM reservations
                WHERE event_id = $1 AND user_id = $2 AND status IN ('pending', 'confirmed')
            )
            "#,
        )
        .bind(event_id)
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn insert_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO reservations (id, event_id, user_id, number_of_tickets, total_amount,
                                      status, applied_promo_code, external_payment_reference,
                                      created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.event_id)
        .bind(reservation.user_id)
        .bind(reservation.number_of_tickets)
        .bind(reservation.total_amount)
        .bind(reservation.status)
        .bind(reservation.applied_promo_code)
        .bind(&reservation.external_payment_reference)
        .bind(reservation.created_at)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_reservation(&mut self, reservation_id: Uuid) -> StoreResult<Option<Reservation>> {
        let sql = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
        let reservation = sqlx::query_as::<_, Reservation>(&sql)
            .bind(reservation_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(reservation)
    }

    async fn lock_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> StoreResult<Option<Reservation>> {
        let sql =
            format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE");
        let reservation = sqlx::query_as::<_, Reservation>(&sql)
            .bind(reservation_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(reservation)
    }

    async fn lock_reservation_by_reference(
        &mut self,
        external_reference: &str,
    ) -> StoreResult<Option<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE external_payment_reference = $1 FOR UPDATE"
        );
        let reservation = sqlx::query_as::<_, Reservation>(&sql)
            .bind(external_reference)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(reservation)
    }

    async fn update_reservation(&mut self, reservation: &Reservation) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE reservations
            SET number_of_tickets = $2,
                total_amount = $3,
                status = $4,
                applied_promo_code = $5,
                external_payment_reference = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(reservation.id)
        .bind(reservation.number_of_tickets)
        .bind(reservation.total_amount)
        .bind(reservation.status)
        .bind(reservation.applied_promo_code)
        .bind(&reservation.external_payment_reference)
        .bind(reservation.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_user_reservations(&mut self, user_id: Uuid) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE user_id = $1 ORDER BY created_at DESC"
        );
        let reservations = sqlx::query_as::<_, Reservation>(&sql)
            .bind(user_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(reservations)
    }

    async fn lock_abandoned_reservations(
        &mut self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> StoreResult<Vec<Reservation>> {
        let sql = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE status = 'pending' AND created_at < $1 \
             ORDER BY created_at \
             LIMIT $2 \
             FOR UPDATE SKIP LOCKED"
        );
        let reservations = sqlx::query_as::<_, Reservation>(&sql)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(reservations)
    }

    async fn insert_promo_code(&mut self, promo: &PromoCode) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO promo_codes (id, event_id, code, discount_percent, used, used_by,
                                     used_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (event_id, code) DO NOTHING
            "#,
        )
        .bind(promo.id)
        .bind(promo.event_id)
        .bind(&promo.code)
        .bind(promo.discount_percent)
        .bind(promo.used)
        .bind(promo.used_by)
        .bind(promo.used_at)
        .bind(promo.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn claim_promo_code(
        &mut self,
        event_id: Uuid,
        code: &str,
        user_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<PromoCode>> {
        let sql = format!(
            "UPDATE promo_codes SET used = TRUE, used_by = $3, used_at = $4 \
             WHERE event_id = $1 AND code = $2 AND used = FALSE \
             RETURNING {PROMO_COLUMNS}"
        );
        let promo = sqlx::query_as::<_, PromoCode>(&sql)
            .bind(event_id)
            .bind(code)
            .bind(user_id)
            .bind(at)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(promo)
    }

    async fn lock_promo_code(&mut self, promo_id: Uuid) -> StoreResult<Option<PromoCode>> {
        let sql = format!("SELECT {PROMO_COLUMNS} FROM promo_codes WHERE id = $1 FOR UPDATE");
        let promo = sqlx::query_as::<_, PromoCode>(&sql)
            .bind(promo_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(promo)
    }

    async fn update_promo_code(&mut self, promo: &PromoCode) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE promo_codes SET used = $2, used_by = $3, used_at = $4
            WHERE id = $1
            "#,
        )
        .bind(promo.id)
        .bind(promo.used)
        .bind(promo.used_by)
        .bind(promo.used_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn list_promo_codes(&mut self, event_id: Uuid) -> StoreResult<Vec<PromoCode>> {
        let sql = format!(
            "SELECT {PROMO_COLUMNS} FROM promo_codes WHERE event_id = $1 ORDER BY created_at, code"
        );
        let codes = sqlx::query_as::<_, PromoCode>(&sql)
            .bind(event_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(codes)
    }

    async fn payment_for_reservation(
        &mut self,
        reservation_id: Uuid,
    ) -> StoreResult<Option<Payment>> {
        let sql = format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE reservation_id = $1 FOR UPDATE"
        );
        let payment = sqlx::query_as::<_, Payment>(&sql)
            .bind(reservation_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(payment)
    }

    async fn insert_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, reservation_id, external_reference, amount,
                                  refunded_amount, method, status, paid_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id)
        .bind(payment.reservation_id)
        .bind(&payment.external_reference)
        .bind(payment.amount)
        .bind(payment.refunded_amount)
        .bind(&payment.method)
        .bind(payment.status)
        .bind(payment.paid_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn update_payment(&mut self, payment: &Payment) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE payments SET refunded_amount = $2, status = $3
            WHERE id = $1
            "#,
        )
        .bind(payment.id)
        .bind(payment.refunded_amount)
        .bind(payment.status)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_revenue(&mut self, owner_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO organizer_revenue (owner_id, total_revenue, updated_at)
            VALUES ($1, 0, NOW())
            ON CONFLICT (owner_id) DO NOTHING
            "#,
        )
        .bind(owner_id)
        .execute(&mut *self.tx)
        .await?;

        sqlx::query("SELECT owner_id FROM organizer_revenue WHERE owner_id = $1 FOR UPDATE")
            .bind(owner_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn confirmed_revenue(&mut self, owner_id: Uuid) -> StoreResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(r.total_amount), 0)
            FROM reservations r
            JOIN events e ON e.id = r.event_id
            LEFT JOIN payments p ON p.reservation_id = r.id
            WHERE e.owner_id = $1
              AND r.status = 'confirmed'
              AND ((e.is_paid AND p.status = 'paid') OR NOT e.is_paid)
            "#,
        )
        .bind(owner_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(total)
    }

    async fn store_revenue(
        &mut self,
        owner_id: Uuid,
        total: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO organizer_revenue (owner_id, total_revenue, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_id)
            DO UPDATE SET total_revenue = EXCLUDED.total_revenue, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(owner_id)
        .bind(total)
        .bind(at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn get_revenue(&mut self, owner_id: Uuid) -> StoreResult<Option<OrganizerRevenue>> {
        let revenue = sqlx::query_as::<_, OrganizerRevenue>(
            "SELECT owner_id, total_revenue, updated_at FROM organizer_revenue WHERE owner_id = $1",
        )
        .bind(owner_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(revenue)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let PgTx { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
