//! Session authentication middleware.
//!
//! Reads the session token from the configured cookie (or an
//! `Authorization: Bearer` header), validates it and injects the
//! [`AdminPrincipal`] into request extensions. Requests without a valid
//! token are rejected with 401 before reaching a handler.

use crate::auth::{cookie_value, validate_jwt_token, AdminPrincipal, AuthConfig};
use crate::error::ApiError;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

/// Find the session token in request headers.
///
/// The cookie wins over the bearer header when both are present.
pub fn extract_token<'a>(headers: &'a HeaderMap, cookie_name: &str) -> Option<&'a str> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| cookie_value(value, cookie_name));

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    })
}

/// Axum middleware guarding admin routes.
pub async fn auth_middleware(
    State(auth_config): State<Arc<AuthConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(request.headers(), &auth_config.cookie_name)
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    let claims = validate_jwt_token(&auth_config, token)?;
    let principal = AdminPrincipal::try_from(claims)?;

    tracing::debug!(admin = %principal.username, "Authenticated admin request");
    request.extensions_mut().insert(principal);

    Ok(next.run(request).await)
}

/// Typed extractor for the authenticated administrator.
///
/// `auth_middleware` must be applied to the route; otherwise extraction
/// fails with 401.
#[derive(Debug, Clone)]
pub struct AdminExtractor(pub AdminPrincipal);

#[async_trait]
impl<S> FromRequestParts<S> for AdminExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AdminPrincipal>()
            .cloned()
            .map(AdminExtractor)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl std::ops::Deref for AdminExtractor {
    type Target = AdminPrincipal;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{generate_jwt_token, JwtSecret};
    use axum::{body::Body, http::StatusCode, middleware, routing::get, Router};
    use tower::ServiceExt;
    use uuid::Uuid;
    use verity_core::ManualClock;

    fn test_auth() -> Arc<AuthConfig> {
        Arc::new(
            AuthConfig {
                jwt_secret: JwtSecret::new("middleware-test-secret-0123456789abcdef".to_string())
                    .unwrap(),
                ..AuthConfig::default()
            }
            .with_clock(Arc::new(ManualClock::default())),
        )
    }

    fn app(auth: Arc<AuthConfig>) -> Router {
        Router::new()
            .route(
                "/whoami",
                get(|AdminExtractor(admin): AdminExtractor| async move { admin.username }),
            )
            .layer(middleware::from_fn_with_state(auth, auth_middleware))
    }

    #[tokio::test]
    async fn test_missing_cookie_is_unauthorized() {
        let response = app(test_auth())
            .oneshot(Request::builder().uri("/whoami").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_cookie_reaches_handler() {
        let auth = test_auth();
        let token = generate_jwt_token(&auth, Uuid::now_v7(), "registrar").unwrap();

        let response = app(auth)
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::COOKIE, format!("verity_admin={token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"registrar");
    }

    #[tokio::test]
    async fn test_bearer_header_is_accepted() {
        let auth = test_auth();
        let token = generate_jwt_token(&auth, Uuid::now_v7(), "registrar").unwrap();

        let response = app(auth)
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_tampered_token_is_unauthorized() {
        let response = app(test_auth())
            .oneshot(
                Request::builder()
                    .uri("/whoami")
                    .header(header::COOKIE, "verity_admin=eyJhbGciOiJIUzI1NiJ9.e30.bad")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_extract_token_prefers_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "verity_admin=from-cookie".parse().unwrap());
        headers.insert(header::AUTHORIZATION, "Bearer from-header".parse().unwrap());
        assert_eq!(extract_token(&headers, "verity_admin"), Some("from-cookie"));

        headers.remove(header::COOKIE);
        assert_eq!(extract_token(&headers, "verity_admin"), Some("from-header"));
    }
}
