use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

use crate::error::AppError;

/// Process-wide request budget for write endpoints
pub struct RateLimitLayer {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
}

impl RateLimitLayer {
    /// `requests_per_minute` of zero is treated as one
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let burst = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);

        RateLimitLayer {
            limiter: RateLimiter::direct(Quota::per_minute(burst)),
        }
    }

    pub fn check(&self) -> Result<(), AppError> {
        self.limiter.check().map_err(|_| AppError::RateLimited)
    }
}

/// Rate limiting middleware for specific endpoints
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimitLayer>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(e) = limiter.check() {
        warn!("⛔ Rate limit hit on {}", req.uri().path());
        return Err(e);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_reject() {
        let limiter = RateLimitLayer::per_minute(3);
        for _ in 0..3 {
            assert!(limiter.check().is_ok());
        }
        assert!(matches!(limiter.check(), Err(AppError::RateLimited)));
    }

    #[test]
    fn test_zero_budget_still_allows_one() {
        let limiter = RateLimitLayer::per_minute(0);
        assert!(limiter.check().is_ok());
        assert!(limiter.check().is_err());
    }
}
