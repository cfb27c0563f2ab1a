use redis::RedisResult;
use tracing::info;

/// Fixed-window request counter shared by every API instance. The window starts
/// with a client's first request and is not extended by later ones.
#[derive(Clone)]
pub struct RedisRateLimiter {
    client: redis::Client,
}

impl RedisRateLimiter {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        info!("Redis rate limiter configured");
        Ok(Self { client })
    }

    /// Counts one request against `key` and reports whether it is still within `limit`.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let (count,): (i64,) = window_pipeline(key, window_seconds).query_async(&mut conn).await?;
        Ok(count <= limit)
    }
}

/// Opens the window only when the key does not exist yet, so later hits never
/// extend it. Yields the post-increment count.
fn window_pipeline(key: &str, window_seconds: i64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("SET")
        .arg(key)
        .arg(0)
        .arg("EX")
        .arg(window_seconds)
        .arg("NX")
        .ignore()
        .incr(key, 1);
    pipe
}

pub fn rate_limit_key(subject: &str) -> String {
    format!("rate_limit:{}", subject)
}
