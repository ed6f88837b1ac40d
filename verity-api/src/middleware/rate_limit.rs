//! Flood protection and client address resolution.
//!
//! An in-process governor limiter per client address, applied to every
//! route. This is independent of the persisted public search quota in
//! [`crate::services::rate_limit`].

use crate::config::ApiConfig;
use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, Extensions, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{clock::DefaultClock, Quota, RateLimiter};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectRateLimiter =
    RateLimiter<governor::state::NotKeyed, governor::state::InMemoryState, DefaultClock>;

/// Address recorded when neither proxy headers nor the socket are available.
pub const UNKNOWN_CLIENT: &str = "unknown";

// ============================================================================
// CLIENT ADDRESS
// ============================================================================

/// Resolve the client address, preferring proxy headers.
pub fn client_address(headers: &HeaderMap, extensions: &Extensions) -> String {
    if let Some(forwarded_for) = headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(first) = forwarded_for.split(',').next().map(str::trim) {
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    if let Some(real_ip) = headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
    {
        return real_ip.to_string();
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

/// Extractor for the resolved client address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddress(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientAddress
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientAddress(client_address(&parts.headers, &parts.extensions)))
    }
}

// ============================================================================
// FLOOD LIMITER
// ============================================================================

/// State for the flood protection middleware.
#[derive(Clone)]
pub struct FloodLimitState {
    config: Arc<ApiConfig>,
    limiters: Arc<DashMap<String, Arc<DirectRateLimiter>>>,
}

impl FloodLimitState {
    pub fn new(config: Arc<ApiConfig>) -> Self {
        Self {
            config,
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn limiter_for(&self, client: &str) -> Arc<DirectRateLimiter> {
        let limiter = self
            .limiters
            .entry(client.to_string())
            .or_insert_with(|| {
                let quota = Quota::per_minute(
                    NonZeroU32::new(self.config.flood_limit_per_minute).unwrap_or(NonZeroU32::MIN),
                )
                .allow_burst(
                    NonZeroU32::new(self.config.flood_limit_burst).unwrap_or(NonZeroU32::MIN),
                );
                Arc::new(RateLimiter::direct(quota))
            });
        limiter.clone()
    }
}

/// Rejection carrying the wait time.
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        ApiError::too_many_requests(Some(self.retry_after)).into_response()
    }
}

/// Per-client flood protection.
///
/// Rejected requests get 429 with `retry-after`.
pub async fn rate_limit_middleware(
    State(state): State<FloodLimitState>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.flood_limit_enabled {
        return Ok(next.run(request).await);
    }

    let client = client_address(request.headers(), request.extensions());
    let limiter = state.limiter_for(&client);

    match limiter.check() {
        Ok(_) => {
            let mut response = next.run(request).await;
            if !response.headers().contains_key("x-ratelimit-limit") {
                if let Ok(value) = HeaderValue::from_str(&state.config.flood_limit_per_minute.to_string()) {
                    response.headers_mut().insert("x-ratelimit-limit", value);
                }
            }
            Ok(response)
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(governor::clock::Clock::now(&DefaultClock::default()))
                .as_secs()
                .max(1);
            tracing::warn!(%client, retry_after, "Flood limit exceeded");
            Err(RateLimitError { retry_after })
        }
    }
}
