use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer};
use crate::handlers::{events, health_check, payments, promo_codes, reservations, revenue};
use crate::state::AppState;

pub fn create_routes(state: AppState) -> Router {
    let security = create_security_headers_layer(state.config.production);
    let cors = create_cors_layer(&state.config.cors_allowed_origins);

    let api = Router::new()
        .route("/events", post(events::create_event))
        .route("/events/:event_id", get(events::get_event))
        .route(
            "/events/:event_id/promo-codes",
            post(promo_codes::issue_promo_codes).get(promo_codes::list_promo_codes),
        )
        .route(
            "/reservations",
            post(reservations::create_reservation).get(reservations::list_reservations),
        )
        .route("/reservations/:reservation_id", get(reservations::get_reservation))
        .route(
            "/reservations/:reservation_id/cancel",
            post(reservations::cancel_reservation),
        )
        .route("/payments/verify", post(payments::verify_payment))
        .route("/payments/webhook", post(payments::payment_webhook))
        .route("/organizers/me/revenue", get(revenue::get_revenue))
        .route(
            "/organizers/me/revenue/recompute",
            post(revenue::recompute_revenue),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(security)
        .layer(cors)
}
