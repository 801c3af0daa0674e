pub mod booking;
pub mod config;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod payments;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
