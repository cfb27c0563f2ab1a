use seatline_booking::{
    AvailabilitySynchronizer, CascadeEngine, ReservationEngine, RetryPolicy, ScheduleManager,
};
use seatline_core::{CatalogStore, ReservationStore};
use seatline_store::app_config::ReservationRules;
use seatline_store::RedisRateLimiter;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct RateLimit {
    pub limiter: Arc<RedisRateLimiter>,
    pub requests: i64,
    pub window_seconds: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: ReservationEngine,
    pub availability: AvailabilitySynchronizer,
    pub cascade: CascadeEngine,
    pub schedules: ScheduleManager,
    /// Applied to admin cascades.
    pub retry: RetryPolicy,
    /// `None` disables rate limiting.
    pub rate_limit: Option<RateLimit>,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        catalog: Arc<dyn CatalogStore>,
        rules: &ReservationRules,
        auth: AuthConfig,
    ) -> Self {
        let engine = ReservationEngine::new(Arc::clone(&reservations), Arc::clone(&catalog))
            .with_default_capacity(rules.default_seat_capacity);
        let schedules = ScheduleManager::new(Arc::clone(&catalog));
        let cascade = CascadeEngine::new(reservations, catalog).with_batch_size(rules.batch_size);

        Self {
            availability: AvailabilitySynchronizer::new(engine.clone()),
            engine,
            cascade,
            schedules,
            retry: RetryPolicy::default(),
            rate_limit: None,
            auth,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}
