//! REST API Routes Module
//!
//! Includes:
//! - Public diploma search under /api/v1/search
//! - Admin session endpoints under /api/v1/auth
//! - Admin CRUD, bulk import and stats under /api/v1/admin (auth required)
//! - Health check endpoints (Kubernetes-compatible)
//! - Prometheus metrics and the OpenAPI document
//! - CORS support for the browser front ends

pub mod auth;
pub mod diploma;
pub mod health;
pub mod import;
pub mod search;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    BoxError, Router,
};
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::{auth_middleware, rate_limit_middleware, FloodLimitState};
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

/// Handler for /openapi.json endpoint.
#[cfg(feature = "openapi")]
async fn openapi_json() -> impl axum::response::IntoResponse {
    use utoipa::OpenApi;
    axum::Json(crate::openapi::ApiDoc::openapi())
}

/// Map a tower middleware error (timeout) into the error envelope.
async fn handle_middleware_error(err: BoxError) -> ApiError {
    if err.is::<tower::timeout::error::Elapsed>() {
        ApiError::timeout("request")
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        ApiError::internal_error("Internal server error")
    }
}

// ============================================================================
// SECURE ROUTER BUILDER
// ============================================================================

/// Builder assembling the routes with the full middleware stack.
pub struct SecureRouterBuilder {
    state: AppState,
    api_config: Arc<ApiConfig>,
    auth_config: Arc<AuthConfig>,
    flood_state: FloodLimitState,
}

impl SecureRouterBuilder {
    /// Create a new SecureRouterBuilder.
    ///
    /// Fails when the auth configuration is unsafe for the configured
    /// environment.
    pub fn new(state: AppState) -> ApiResult<Self> {
        state
            .auth
            .validate_for_production(&state.config.environment)?;

        let api_config = state.config.clone();
        let auth_config = state.auth.clone();
        let flood_state = FloodLimitState::new(api_config.clone());

        Ok(Self {
            state,
            api_config,
            auth_config,
            flood_state,
        })
    }

    /// Build the admin routes (require authentication).
    fn build_admin_routes(&self) -> Router<AppState> {
        Router::new()
            .nest("/diplomas", diploma::create_router())
            .nest("/import", import::create_router(self.api_config.import_max_bytes))
            .nest("/stats", stats::create_router())
            .layer(from_fn_with_state(self.auth_config.clone(), auth_middleware))
    }

    /// Build the complete router with full security stack.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS (outermost) - handles preflight requests
    /// 2. Compression
    /// 3. Observability - tracing and metrics
    /// 4. Flood protection - rejects floods before any work
    /// 5. Request timeout
    /// 6. Auth (innermost, only on /api/v1/admin/* and /api/v1/auth/me)
    pub fn build(self) -> Router {
        let api_routes = Router::new()
            .merge(search::create_router())
            .nest("/auth", auth::create_router(self.auth_config.clone()))
            .nest("/admin", self.build_admin_routes());

        #[allow(unused_mut)]
        let mut router = Router::new()
            .nest("/api/v1", api_routes)
            .nest("/health", health::create_router())
            .route("/metrics", get(metrics_handler));

        #[cfg(feature = "openapi")]
        {
            router = router.route("/openapi.json", get(openapi_json));
        }

        let cors = build_cors_layer(&self.api_config);
        let timeout = ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_middleware_error))
            .timeout(self.api_config.request_timeout);

        // Execution order: CORS -> Compression -> Observability -> Flood limit -> Timeout -> Handler
        router
            .layer(timeout)
            .layer(from_fn_with_state(self.flood_state, rate_limit_middleware))
            .layer(from_fn(observability_middleware))
            .layer(CompressionLayer::new())
            .layer(cors)
            .with_state(self.state)
    }
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderName::from_static("retry-after"),
            header::CONTENT_DISPOSITION,
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: Development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any).expose_headers(Any)
    } else {
        tracing::info!(
            "CORS: Production mode - allowing origins: {:?}",
            config.cors_origins
        );
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        if config.cors_allow_credentials {
            cors.allow_origin(origins).allow_credentials(true)
        } else {
            cors.allow_origin(origins)
        }
    }
}

/// Create the API router with authentication, flood protection and CORS.
///
/// # Security
/// - /api/v1/admin/* and /api/v1/auth/me require a session cookie
/// - Flood protection is applied globally
/// - Refuses the insecure default JWT secret in production
pub fn create_api_router(state: AppState) -> ApiResult<Router> {
    SecureRouterBuilder::new(state).map(SecureRouterBuilder::build)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_builds_for_both_modes() {
        let _ = build_cors_layer(&ApiConfig::default());

        let config = ApiConfig {
            cors_origins: vec!["https://tracuu.example.edu.vn".to_string()],
            cors_allow_credentials: true,
            ..ApiConfig::default()
        };
        let _ = build_cors_layer(&config);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_envelope() {
        let err: BoxError = Box::new(tower::timeout::error::Elapsed::new());
        let api_err = handle_middleware_error(err).await;
        assert_eq!(api_err.code, crate::error::ErrorCode::Timeout);
    }
}
