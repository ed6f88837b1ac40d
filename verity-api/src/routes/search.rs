//! Public Search Endpoint
//!
//! `POST /api/v1/search`, open to anonymous clients. The human verification
//! token in the body is checked first, then the search service runs the
//! quota, cache and storage steps. Successful and not-found responses carry
//! `x-ratelimit-*` headers describing the client's remaining quota.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use verity_core::PublicDiploma;

use crate::error::{ApiError, ApiResult};
use crate::extractors::ApiJson;
use crate::middleware::ClientAddress;
use crate::services::{HumanVerifier, RateLimitDecision, SearchContext, SearchQuery, SearchService};
use crate::state::AppState;
use crate::types::ApiResponse;

static RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
static RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
static RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Quota headers for a search response.
fn quota_headers(quota: &RateLimitDecision) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let values = [
        (&RATE_LIMIT_LIMIT, quota.limit.to_string()),
        (&RATE_LIMIT_REMAINING, quota.remaining.to_string()),
        (&RATE_LIMIT_RESET, quota.reset_at.timestamp().to_string()),
    ];
    for (name, value) in values {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(name.clone(), value);
        }
    }
    headers
}

/// POST /api/v1/search - Look up a diploma by number or by student details
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/search",
    tag = "Search",
    request_body = SearchQuery,
    responses(
        (status = 200, description = "Diploma found", body = ApiResponse<PublicDiploma>),
        (status = 400, description = "Invalid query or verification rejected", body = crate::error::ErrorBody),
        (status = 404, description = "No active diploma matches", body = crate::error::ErrorBody),
        (status = 429, description = "Search quota exhausted", body = crate::error::ErrorBody),
        (status = 503, description = "Storage or verification service unavailable", body = crate::error::ErrorBody),
    ),
))]
pub async fn search_diploma(
    State(search): State<SearchService>,
    State(verifier): State<Arc<dyn HumanVerifier>>,
    ClientAddress(client_address): ClientAddress,
    headers: HeaderMap,
    ApiJson(query): ApiJson<SearchQuery>,
) -> ApiResult<Response> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let verification = verifier
        .verify(query.captcha_token.as_deref(), &client_address)
        .await;

    let ctx = SearchContext {
        client_address,
        user_agent,
    };
    let outcome = search.search(&query, verification, &ctx).await?;
    let quota = quota_headers(&outcome.quota);

    Ok(match outcome.diploma {
        Some(diploma) => {
            let message = if outcome.cached {
                "Diploma found (cached)"
            } else {
                "Diploma found"
            };
            (quota, ApiResponse::ok(message, diploma)).into_response()
        }
        None => (quota, ApiError::diploma_not_found()).into_response(),
    })
}

/// Create the public search router (mounted under `/api/v1`).
pub fn create_router() -> Router<AppState> {
    Router::new().route("/search", post(search_diploma))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_quota_headers() {
        let quota = RateLimitDecision {
            allowed: true,
            limit: 30,
            remaining: 29,
            reset_at: Utc.with_ymd_and_hms(2024, 6, 1, 1, 0, 0).unwrap(),
        };
        let headers = quota_headers(&quota);
        assert_eq!(headers["x-ratelimit-limit"], "30");
        assert_eq!(headers["x-ratelimit-remaining"], "29");
        assert_eq!(headers["x-ratelimit-reset"], "1717203600");
    }
}
