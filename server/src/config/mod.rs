use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

use crate::booking::BookingPolicy;

pub mod cors;
pub mod security;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/booking";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";
const DEFAULT_PAYMENT_API_BASE: &str = "https://api.stripe.com/v1";

const MAX_HOLD_TTL_MINUTES: i64 = 24 * 60;
const MAX_CANCELLATION_WINDOW_HOURS: i64 = 365 * 24;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub api_base: String,
    /// Without a key the server runs against the offline gateway.
    pub api_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
    pub currency: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_PAYMENT_API_BASE.to_string(),
            api_key: None,
            webhook_secret: None,
            success_url: "http://localhost:3000/checkout/success".to_string(),
            cancel_url: "http://localhost:3000/checkout/cancel".to_string(),
            currency: "usd".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub db_max_connections: u32,
    pub cors_allowed_origins: String,
    /// Enables HSTS.
    pub production: bool,
    pub reaper_interval: std::time::Duration,
    pub booking: BookingPolicy,
    pub payments: PaymentsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3001)),
            db_max_connections: 5,
            cors_allowed_origins: DEFAULT_ALLOWED_ORIGINS.to_string(),
            production: false,
            reaper_interval: std::time::Duration::from_secs(60),
            booking: BookingPolicy::default(),
            payments: PaymentsConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; unset variables fall back
    /// to their defaults, malformed ones are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let policy = defaults.booking;
        let payments = defaults.payments;
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let booking = BookingPolicy {
            hold_ttl: parse_bounded(&var, "HOLD_TTL_MINUTES", MAX_HOLD_TTL_MINUTES)?
                .map(Duration::minutes)
                .unwrap_or(policy.hold_ttl),
            cancellation_window: parse_bounded(
                &var,
                "CANCELLATION_WINDOW_HOURS",
                MAX_CANCELLATION_WINDOW_HOURS,
            )?
            .map(Duration::hours)
            .unwrap_or(policy.cancellation_window),
            max_tickets_per_reservation: parse(&var, "MAX_TICKETS_PER_RESERVATION")?
                .unwrap_or(policy.max_tickets_per_reservation),
        };
        if booking.max_tickets_per_reservation < 1 {
            return Err(ConfigError::Invalid {
                name: "MAX_TICKETS_PER_RESERVATION",
                value: booking.max_tickets_per_reservation.to_string(),
            });
        }

        Ok(Self {
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: parse(&var, "BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            db_max_connections: parse(&var, "DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                .unwrap_or(defaults.cors_allowed_origins),
            production: var("RUST_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production")),
            reaper_interval: parse(&var, "REAPER_INTERVAL_SECS")?
                .map(std::time::Duration::from_secs)
                .unwrap_or(defaults.reaper_interval),
            booking,
            payments: PaymentsConfig {
                api_base: var("PAYMENT_API_BASE").unwrap_or(payments.api_base),
                api_key: var("PAYMENT_API_KEY"),
                webhook_secret: var("PAYMENT_WEBHOOK_SECRET"),
                success_url: var("CHECKOUT_SUCCESS_URL").unwrap_or(payments.success_url),
                cancel_url: var("CHECKOUT_CANCEL_URL").unwrap_or(payments.cancel_url),
                currency: var("CURRENCY").unwrap_or(payments.currency),
            },
        })
    }
}

fn parse<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match var(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
    }
}

/// Whole units in `1..=max`.
fn parse_bounded(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    max: i64,
) -> Result<Option<i64>, ConfigError> {
    match parse::<i64>(var, name)? {
        Some(value) if !(1..=max).contains(&value) => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
        other => Ok(other),
    }
}
