pub mod app_config;
pub mod database;
pub mod memory;
pub mod redis_repo;

pub use app_config::{Config, StorageBackend};
pub use database::PgStore;
pub use memory::MemoryStore;
pub use redis_repo::RedisRateLimiter;
