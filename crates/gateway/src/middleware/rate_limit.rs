//! Rate limiting middleware using token bucket algorithm

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use profrag_common::{
    config::RateLimitConfig,
    errors::{AppError, Result},
    metrics::METRICS_PREFIX,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter using governor crate
pub type GlobalRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

/// Limiter plus the configured rate, reported back in rejections
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<GlobalRateLimiter>,
    requests_per_second: u32,
}

/// Create a new rate limiter
pub fn create_rate_limiter(config: &RateLimitConfig) -> Result<RateLimitState> {
    let rps = NonZeroU32::new(config.requests_per_second).ok_or_else(|| AppError::Configuration {
        message: "rate_limit.requests_per_second must be at least 1".to_string(),
    })?;
    let burst = NonZeroU32::new(config.burst).unwrap_or(rps);

    Ok(RateLimitState {
        limiter: Arc::new(RateLimiter::direct(Quota::per_second(rps).allow_burst(burst))),
        requests_per_second: config.requests_per_second,
    })
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    request: Request,
    next: Next,
) -> Response {
    match state.limiter.check() {
        Ok(_) => next.run(request).await,
        Err(_) => {
            tracing::warn!(path = %request.uri().path(), "Rate limit exceeded");
            metrics::counter!(format!("{}_rate_limited_total", METRICS_PREFIX)).increment(1);
            AppError::RateLimited {
                limit: state.requests_per_second,
            }
            .into_response()
        }
    }
}
