//! Admin session endpoints.
//!
//! Login issues an HS256 session token in an HttpOnly cookie, logout
//! expires it and `me` echoes the authenticated administrator.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use verity_storage::RegistryStore;

use crate::auth::{
    clear_session_cookie, generate_jwt_token, session_cookie, verify_password, AdminPrincipal,
    AuthConfig,
};
use crate::error::{ApiError, ApiResult};
use crate::extractors::ApiJson;
use crate::middleware::{auth_middleware, AdminExtractor};
use crate::state::AppState;
use crate::types::{ApiResponse, LoginRequest, SessionResponse};

fn with_cookie(mut response: Response, cookie: &str) -> ApiResult<Response> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| ApiError::internal_error(format!("Invalid cookie header: {}", e)))?;
    response.headers_mut().insert(header::SET_COOKIE, value);
    Ok(response)
}

/// POST /api/v1/auth/login - Start an admin session
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, session cookie set", body = ApiResponse<SessionResponse>),
        (status = 401, description = "Wrong username or password", body = crate::error::ErrorBody),
    ),
))]
pub async fn login(
    State(storage): State<Arc<dyn RegistryStore>>,
    State(auth): State<Arc<AuthConfig>>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Response> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::missing_field("username"));
    }
    if req.password.is_empty() {
        return Err(ApiError::missing_field("password"));
    }

    // Unknown, disabled and wrong-password accounts share one error.
    let admin = storage
        .admin_find_by_username(username)
        .await?
        .filter(|admin| admin.is_active)
        .filter(|admin| verify_password(&req.password, &admin.password_hash))
        .ok_or_else(|| {
            tracing::warn!(%username, "Failed admin login");
            ApiError::invalid_credentials()
        })?;

    let token = generate_jwt_token(&auth, admin.id, &admin.username)?;

    if let Err(e) = storage.admin_record_login(admin.id, auth.clock.now()).await {
        tracing::warn!(error = %e, admin = %admin.username, "Failed to record last login");
    }
    tracing::info!(admin = %admin.username, "Admin logged in");

    let body = ApiResponse::ok(
        "Logged in",
        SessionResponse {
            admin: AdminPrincipal {
                id: admin.id,
                username: admin.username,
            },
            expires_in: Some(auth.jwt_expiration_secs),
        },
    );
    with_cookie(body.into_response(), &session_cookie(&auth, &token))
}

/// POST /api/v1/auth/logout - End the admin session
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Session cookie cleared"),
    ),
))]
pub async fn logout(State(auth): State<Arc<AuthConfig>>) -> ApiResult<Response> {
    let body = ApiResponse::<()>::message("Logged out");
    with_cookie(body.into_response(), &clear_session_cookie(&auth))
}

/// GET /api/v1/auth/me - Current administrator
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/auth/me",
    tag = "Auth",
    responses(
        (status = 200, description = "Authenticated administrator", body = ApiResponse<SessionResponse>),
        (status = 401, description = "No valid session", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn me(AdminExtractor(admin): AdminExtractor) -> ApiResponse<SessionResponse> {
    ApiResponse::ok(
        "Authenticated",
        SessionResponse {
            admin,
            expires_in: None,
        },
    )
}

/// Create the auth router (mounted under `/api/v1/auth`).
pub fn create_router(auth: Arc<AuthConfig>) -> Router<AppState> {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(from_fn_with_state(auth, auth_middleware));

    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(protected)
}
