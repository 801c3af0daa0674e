use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use booking_server::booking::reaper::spawn_reaper;
use booking_server::booking::{BookingService, SystemClock};
use booking_server::config::Config;
use booking_server::notify::LogNotifier;
use booking_server::payments::{OfflineGateway, PaymentGateway, StripeGateway};
use booking_server::routes::create_routes;
use booking_server::state::AppState;
use booking_server::store::PgStore;

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().expect("Invalid configuration");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    let store = PgStore::new(pool);
    store.migrate().await.expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let gateway: Arc<dyn PaymentGateway> = match config.payments.api_key.clone() {
        Some(api_key) => Arc::new(StripeGateway::new(api_key, &config.payments)),
        None => {
            tracing::warn!("PAYMENT_API_KEY not set, using the offline payment gateway");
            Arc::new(OfflineGateway::new())
        }
    };
    if config.payments.webhook_secret.is_none() {
        tracing::warn!("PAYMENT_WEBHOOK_SECRET not set, webhook deliveries will be rejected");
    }

    let booking = Arc::new(BookingService::new(
        Arc::new(store),
        gateway,
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
        config.booking.clone(),
    ));
    spawn_reaper(Arc::clone(&booking), config.reaper_interval);

    let addr = config.bind_addr;
    let app = create_routes(AppState::new(booking, config));

    tracing::info!("Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
