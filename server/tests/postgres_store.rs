//! Runs against a live database when `DATABASE_URL` is set; skipped otherwise.

mod common;

use std::sync::Arc;

use chrono::Duration;
use sqlx::postgres::PgPoolOptions;
use tokio::task::JoinSet;
use uuid::Uuid;

use booking_server::booking::reservations::CreateReservation;
use booking_server::booking::{BookingPolicy, BookingService, Clock, ManualClock};
use booking_server::models::{Event, NewEvent, ReservationStatus};
use booking_server::payments::OfflineGateway;
use booking_server::store::PgStore;
use booking_server::utils::error::AppError;
use common::{dollars, start_of_test, RecordingNotifier};

struct PgHarness {
    service: Arc<BookingService>,
    clock: Arc<ManualClock>,
    owner: Uuid,
}

async fn connect() -> Option<PgHarness> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping Postgres store test");
        return None;
    };
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .expect("Failed to connect to database");
    let store = PgStore::new(pool);
    store.migrate().await.expect("Failed to run migrations");

    let clock = Arc::new(ManualClock::new(start_of_test()));
    let service = Arc::new(BookingService::new(
        Arc::new(store),
        Arc::new(OfflineGateway::new()),
        Arc::new(RecordingNotifier::default()),
        clock.clone(),
        BookingPolicy::default(),
    ));
    Some(PgHarness {
        service,
        clock,
        owner: Uuid::new_v4(),
    })
}

impl PgHarness {
    async fn event(&self, capacity: i32, price: Option<rust_decimal::Decimal>) -> Event {
        let start_time = self.clock.now() + Duration::days(7);
        self.service
            .create_event(
                self.owner,
                NewEvent {
                    title: "Database Internals".to_string(),
                    capacity,
                    price,
                    is_paid: price.is_some(),
                    is_online: false,
                    start_time,
                    end_time: start_time + Duration::hours(2),
                },
            )
            .await
            .unwrap()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pg_concurrent_confirmations_record_one_payment() {
    let Some(h) = connect().await else { return };
    let event = h.event(10, Some(dollars(2500))).await;
    let created = h
        .service
        .create_reservation(CreateReservation {
            event_id: event.id,
            user_id: Uuid::new_v4(),
            quantity: 2,
            promo_code: None,
        })
        .await
        .unwrap();
    let reservation_id = created.reservation.id;
    let reference = format!("pi_race_{reservation_id}");

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let service = Arc::clone(&h.service);
        let reference = reference.clone();
        tasks.spawn(async move { service.confirm(reservation_id, &reference).await });
    }

    let mut fresh = 0;
    let mut payment_ids = Vec::new();
    while let Some(result) = tasks.join_next().await {
        let outcome = result.unwrap().unwrap();
        assert_eq!(outcome.reservation.status, ReservationStatus::Confirmed);
        if !outcome.already_processed {
            fresh += 1;
        }
        payment_ids.push(outcome.payment.id);
    }
    assert_eq!(fresh, 1);
    payment_ids.dedup();
    assert_eq!(payment_ids.len(), 1);
    assert_eq!(
        h.service.revenue(h.owner).await.unwrap().total_revenue,
        dollars(5000)
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pg_concurrent_bookings_never_oversell() {
    let Some(h) = connect().await else { return };
    let event_id = h.event(15, None).await.id;

    let mut tasks = JoinSet::new();
    for i in 0..30 {
        let service = Arc::clone(&h.service);
        tasks.spawn(async move {
            service
                .create_reservation(CreateReservation {
                    event_id,
                    user_id: Uuid::new_v4(),
                    quantity: 1 + (i % 2),
                    promo_code: None,
                })
                .await
                .map(|created| created.reservation.number_of_tickets)
        });
    }

    let mut booked = 0i64;
    while let Some(result) = tasks.join_next().await {
        match result.unwrap() {
            Ok(tickets) => booked += i64::from(tickets),
            Err(AppError::InsufficientCapacity { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    let availability = h.service.event(event_id).await.unwrap().availability;
    assert!(booked <= 15);
    assert_eq!(availability.held, booked);
    assert_eq!(availability.remaining, 15 - booked);
}
