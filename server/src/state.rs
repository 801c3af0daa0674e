use std::sync::Arc;

use crate::booking::BookingService;
use crate::config::Config;

#[derive(Clone)]
pub struct AppState {
    pub booking: Arc<BookingService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(booking: Arc<BookingService>, config: Config) -> Self {
        Self {
            booking,
            config: Arc::new(config),
        }
    }
}
