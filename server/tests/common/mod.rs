#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use booking_server::booking::reconciliation::ConfirmOutcome;
use booking_server::booking::reservations::{CreateReservation, CreatedReservation};
use booking_server::booking::{BookingPolicy, BookingService, Clock, ManualClock};
use booking_server::models::{Event, NewEvent, PromoCode};
use booking_server::notify::{Notification, Notifier};
use booking_server::payments::{OfflineGateway, SessionStatus};
use booking_server::store::InMemoryStore;
use booking_server::utils::error::AppError;

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// Notifications are delivered from spawned tasks.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: Notification) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

pub fn dollars(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

pub fn start_of_test() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 3, 1, 12, 0, 0).unwrap()
}

pub struct Harness {
    pub service: Arc<BookingService>,
    pub store: InMemoryStore,
    pub gateway: Arc<OfflineGateway>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub owner: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(BookingPolicy::default())
    }

    pub fn with_policy(policy: BookingPolicy) -> Self {
        let store = InMemoryStore::new();
        let gateway = Arc::new(OfflineGateway::new());
        let clock = Arc::new(ManualClock::new(start_of_test()));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = Arc::new(BookingService::new(
            Arc::new(store.clone()),
            gateway.clone(),
            notifier.clone(),
            clock.clone(),
            policy,
        ));
        Self {
            service,
            store,
            gateway,
            clock,
            notifier,
            owner: Uuid::new_v4(),
        }
    }

    pub async fn event(
        &self,
        capacity: i32,
        price: Option<Decimal>,
        is_online: bool,
        starts_in: Duration,
    ) -> Event {
        let start_time = self.clock.now() + starts_in;
        self.service
            .create_event(
                self.owner,
                NewEvent {
                    title: "Systems Programming Night".to_string(),
                    capacity,
                    price,
                    is_paid: price.is_some(),
                    is_online,
                    start_time,
                    end_time: start_time + Duration::hours(3),
                },
            )
            .await
            .unwrap()
    }

    pub async fn paid_event(&self, capacity: i32, price: Decimal) -> Event {
        self.event(capacity, Some(price), false, Duration::days(7)).await
    }

    pub async fn free_event(&self, capacity: i32) -> Event {
        self.event(capacity, None, false, Duration::days(7)).await
    }

    pub async fn promo(&self, event_id: Uuid, discount_percent: i32) -> PromoCode {
        self.service
            .issue_promo_codes(self.owner, event_id, 1, discount_percent)
            .await
            .unwrap()
            .remove(0)
    }

    pub async fn reserve(
        &self,
        event_id: Uuid,
        user_id: Uuid,
        quantity: i32,
        promo_code: Option<&str>,
    ) -> Result<CreatedReservation, AppError> {
        self.service
            .create_reservation(CreateReservation {
                event_id,
                user_id,
                quantity,
                promo_code: promo_code.map(str::to_string),
            })
            .await
    }

    /// Completes checkout at the provider and returns through the
    /// client-side verification path.
    pub async fn pay(&self, created: &CreatedReservation) -> ConfirmOutcome {
        let session = created.checkout.as_ref().expect("checkout session");
        self.gateway.settle(&session.id, SessionStatus::Paid).unwrap();
        self.service
            .verify_checkout(&session.id, created.reservation.user_id)
            .await
            .unwrap()
    }

    pub async fn remaining(&self, event_id: Uuid) -> i64 {
        self.service
            .event(event_id)
            .await
            .unwrap()
            .availability
            .remaining
    }
}
