use seatline_core::repository::{DEFAULT_TRANSACTION_ATTEMPTS, MAX_BATCH_WRITES};
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub auth: AuthConfig,
    #[serde(default)]
    pub reservations: ReservationRules,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReservationRules {
    /// Reservations deleted per batch during cascades.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_transaction_attempts")]
    pub max_transaction_attempts: u32,
    /// Capacity assumed for trips that do not declare one.
    #[serde(default = "default_seat_capacity")]
    pub default_seat_capacity: u32,
}

fn default_batch_size() -> usize { 400 }
fn default_transaction_attempts() -> u32 { DEFAULT_TRANSACTION_ATTEMPTS }
fn default_seat_capacity() -> u32 { 44 }

impl Default for ReservationRules {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_transaction_attempts: default_transaction_attempts(),
            default_seat_capacity: default_seat_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests")]
    pub requests: i64,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
}

fn default_requests() -> i64 { 100 }
fn default_window_seconds() -> i64 { 60 }

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { requests: default_requests(), window_seconds: default_window_seconds() }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `SEATLINE__SERVER__PORT=9000`
            .add_source(config::Environment::with_prefix("SEATLINE").separator("__"))
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let rules = &self.reservations;
        if rules.batch_size == 0 || rules.batch_size > MAX_BATCH_WRITES {
            return Err(config::ConfigError::Message(format!(
                "reservations.batch_size must be between 1 and {}, got {}",
                MAX_BATCH_WRITES, rules.batch_size
            )));
        }
        if rules.max_transaction_attempts == 0 {
            return Err(config::ConfigError::Message(
                "reservations.max_transaction_attempts must be at least 1".into(),
            ));
        }
        if rules.default_seat_capacity == 0 {
            return Err(config::ConfigError::Message(
                "reservations.default_seat_capacity must be positive".into(),
            ));
        }
        if self.storage.backend == StorageBackend::Postgres && self.database.is_none() {
            return Err(config::ConfigError::Message(
                "storage.backend = \"postgres\" requires a [database] section".into(),
            ));
        }
        Ok(())
    }
}
