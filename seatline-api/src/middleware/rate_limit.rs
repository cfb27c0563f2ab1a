use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use seatline_store::redis_repo::rate_limit_key;
use std::net::SocketAddr;
use tracing::warn;

use crate::error::AppError;
use crate::state::AppState;

/// Per-client fixed window counted in Redis. Fails open when Redis is unreachable.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(rate_limit) = &state.rate_limit else {
        return Ok(next.run(req).await);
    };

    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    match rate_limit
        .limiter
        .check_rate_limit(&rate_limit_key(&client), rate_limit.requests, rate_limit.window_seconds)
        .await
    {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err(AppError::RateLimited),
        Err(err) => {
            warn!("Rate limiter unavailable, allowing request: {}", err);
            Ok(next.run(req).await)
        }
    }
}
