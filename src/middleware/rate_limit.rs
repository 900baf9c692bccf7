use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use tracing::warn;

use crate::error::ErrorResponse;

/// Process-wide request budget
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
}

impl RateLimitLayer {
    /// Allow `requests_per_minute` requests per minute, bursting up to the same amount
    pub fn per_minute(requests_per_minute: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN));

        RateLimitLayer {
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    fn check(&self) -> Result<(), Response> {
        self.limiter.check().map_err(|_| {
            warn!("⚠️  Rate limit exceeded");
            let body = Json(ErrorResponse {
                error: "Rate limit exceeded. Please try again later.".to_string(),
                error_code: "RATE_LIMITED".to_string(),
            });
            (StatusCode::TOO_MANY_REQUESTS, body).into_response()
        })
    }
}

/// Rate limiting middleware, used with `axum::middleware::from_fn_with_state`
pub async fn rate_limit_middleware(
    State(limit): State<RateLimitLayer>,
    req: Request,
    next: Next,
) -> Response {
    match limit.check() {
        Ok(()) => next.run(req).await,
        Err(response) => response,
    }
}
