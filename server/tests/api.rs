mod common;

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use booking_server::booking::Clock;
use booking_server::config::Config;
use booking_server::models::ReservationStatus;
use booking_server::payments::webhook::{sign_payload, SIGNATURE_HEADER};
use booking_server::routes::create_routes;
use booking_server::state::AppState;
use common::{dollars, Harness};

const WEBHOOK_SECRET: &str = "whsec_api_test";

fn app(h: &Harness) -> Router {
    let mut config = Config::default();
    config.payments.webhook_secret = Some(WEBHOOK_SECRET.to_string());
    create_routes(AppState {
        booking: Arc::clone(&h.service),
        config: Arc::new(config),
    })
}

fn json_request(method: &str, uri: &str, user: Option<Uuid>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user.to_string());
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_check_carries_security_headers() {
    let h = Harness::new();
    let response = app(&h)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert!(response.headers().get("strict-transport-security").is_none());

    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let h = Harness::new();
    let response = app(&h)
        .oneshot(json_request(
            "POST",
            "/api/reservations",
            None,
            json!({ "event_id": Uuid::new_v4(), "quantity": 1 }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "AUTH_ERROR");
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let h = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/api/reservations")
        .header("content-type", "application/json")
        .header("x-user-id", Uuid::new_v4().to_string())
        .body(Body::from("{\"quantity\": \"lots\"}"))
        .unwrap();
    let response = app(&h).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_event_and_reservation_over_http() {
    let h = Harness::new();
    let organizer = Uuid::new_v4();
    let start = h.clock.now() + chrono::Duration::days(5);

    let response = app(&h)
        .oneshot(json_request(
            "POST",
            "/api/events",
            Some(organizer),
            json!({
                "title": "Compiler Workshop",
                "capacity": 4,
                "price": "12.50",
                "is_paid": true,
                "start_time": start,
                "end_time": start + chrono::Duration::hours(2),
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let event_id = read_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let user = Uuid::new_v4();
    let response = app(&h)
        .oneshot(json_request(
            "POST",
            "/api/reservations",
            Some(user),
            json!({ "event_id": event_id, "quantity": 3 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["data"]["reservation"]["status"], "pending");
    assert_eq!(body["data"]["reservation"]["total_amount"], "37.50");
    assert!(body["data"]["checkout"]["id"].is_string());

    let response = app(&h)
        .oneshot(json_request(
            "POST",
            "/api/reservations",
            Some(Uuid::new_v4()),
            json!({ "event_id": event_id, "quantity": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = read_json(response).await;
    assert_eq!(body["error"]["code"], "INSUFFICIENT_CAPACITY");
    assert_eq!(body["error"]["details"]["remaining"], 1);

    let response = app(&h)
        .oneshot(
            Request::builder()
                .uri(format!("/api/events/{event_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["availability"]["remaining"], 1);
    assert_eq!(body["data"]["title"], "Compiler Workshop");
}

#[tokio::test]
async fn test_signed_webhook_confirms_reservation() {
    let h = Harness::new();
    let event = h.paid_event(10, dollars(2000)).await;
    let user = Uuid::new_v4();
    let created = h.reserve(event.id, user, 2, None).await.unwrap();
    let session_id = created.checkout.clone().unwrap().id;
    let metadata: HashMap<String, String> = h
        .gateway
        .session(&session_id)
        .unwrap()
        .metadata
        .unwrap()
        .to_pairs()
        .into_iter()
        .collect();

    let payload = json!({
        "id": "evt_test_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "status": "complete",
            "payment_status": "paid",
            "amount_total": 4000,
            "metadata": metadata,
            "payment_method_types": ["card"],
        }},
    })
    .to_string();

    let unsigned = Request::builder()
        .method("POST")
        .uri("/api/payments/webhook")
        .header(SIGNATURE_HEADER, "t=1,v1=deadbeef")
        .body(Body::from(payload.clone()))
        .unwrap();
    let response = app(&h).oneshot(unsigned).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let signature =
        sign_payload(payload.as_bytes(), WEBHOOK_SECRET, h.clock.now().timestamp()).unwrap();
    let deliver = || {
        Request::builder()
            .method("POST")
            .uri("/api/payments/webhook")
            .header(SIGNATURE_HEADER, signature.clone())
            .body(Body::from(payload.clone()))
            .unwrap()
    };

    let response = app(&h).oneshot(deliver()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["result"], "confirmed");
    assert_eq!(body["data"]["already_processed"], false);

    let response = app(&h).oneshot(deliver()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["data"]["already_processed"], true);

    let reservation = h.service.reservation(created.reservation.id, user).await.unwrap();
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    assert_eq!(h.store.payment_count(reservation.id).await, 1);
}

#[tokio::test]
async fn test_unhandled_webhook_type_is_acknowledged() {
    let h = Harness::new();
    let payload = json!({
        "id": "evt_test_2",
        "type": "customer.created",
        "data": { "object": { "id": "cus_123" } },
    })
    .to_string();
    let signature =
        sign_payload(payload.as_bytes(), WEBHOOK_SECRET, h.clock.now().timestamp()).unwrap();

    let response = app(&h)
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/payments/webhook")
                .header(SIGNATURE_HEADER, signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["data"]["result"], "ignored");
}

#[tokio::test]
async fn test_revenue_route_reports_owner_total() {
    let h = Harness::new();
    let event = h.paid_event(10, dollars(2000)).await;
    let created = h.reserve(event.id, Uuid::new_v4(), 1, None).await.unwrap();
    h.pay(&created).await;

    let response = app(&h)
        .oneshot(
            Request::builder()
                .uri("/api/organizers/me/revenue")
                .header("x-user-id", h.owner.to_string())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await["data"]["total_revenue"], "20.00");
}
