use anyhow::Context;
use seatline_api::{
    app,
    state::{AppState, AuthConfig, RateLimit},
};
use seatline_core::{CatalogStore, ReservationStore};
use seatline_store::{app_config::Config, MemoryStore, PgStore, RedisRateLimiter, StorageBackend};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// One backend serving both the reservation and catalog seams.
fn shared<S>(store: S) -> (Arc<dyn ReservationStore>, Arc<dyn CatalogStore>)
where
    S: ReservationStore + CatalogStore + 'static,
{
    let store = Arc::new(store);
    let reservations: Arc<dyn ReservationStore> = store.clone();
    let catalog: Arc<dyn CatalogStore> = store;
    (reservations, catalog)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seatline_api=debug,seatline_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Seatline API on port {}", config.server.port);

    let (reservations, catalog): (Arc<dyn ReservationStore>, Arc<dyn CatalogStore>) =
        match config.storage.backend {
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory storage; data is lost on restart");
                shared(MemoryStore::new())
            }
            StorageBackend::Postgres => {
                let database = config
                    .database
                    .as_ref()
                    .context("storage.backend = postgres requires [database]")?;
                let store = PgStore::connect(&database.url, database.max_connections)
                    .await
                    .context("Failed to connect to Postgres")?
                    .with_max_attempts(config.reservations.max_transaction_attempts);
                store.migrate().await.context("Failed to run migrations")?;
                shared(store)
            }
        };

    let mut app_state = AppState::new(
        reservations,
        catalog,
        &config.reservations,
        AuthConfig { secret: config.auth.jwt_secret.clone() },
    );

    match &config.redis {
        Some(redis) => {
            let limiter = RedisRateLimiter::new(&redis.url).context("Invalid Redis URL")?;
            app_state = app_state.with_rate_limit(RateLimit {
                limiter: Arc::new(limiter),
                requests: config.rate_limit.requests,
                window_seconds: config.rate_limit.window_seconds,
            });
        }
        None => tracing::info!("No [redis] section; rate limiting disabled"),
    }

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
