//! API Request and Response Types
//!
//! Envelope and request bodies shared by the REST handlers. Domain payloads
//! (`DiplomaInput`, `DiplomaRecord`, `PublicDiploma`, ...) live in
//! `verity-core`; service-specific reports live next to their service.

use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use verity_core::DiplomaListFilter;

use crate::auth::AdminPrincipal;

// ============================================================================
// ENVELOPE
// ============================================================================

/// Success envelope: `{success: true, message, data}`.
///
/// Errors use [`crate::error::ErrorBody`] with `success: false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiResponse<T> {
    /// Always true
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Envelope without a payload.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

// ============================================================================
// AUTH TYPES
// ============================================================================

/// Request body for `POST /api/v1/auth/login`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Session details returned by login and `me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SessionResponse {
    pub admin: AdminPrincipal,
    /// Session lifetime in seconds, absent for `me`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
}

// ============================================================================
// DIPLOMA LISTING
// ============================================================================

/// Query string of `GET /api/v1/admin/diplomas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct ListDiplomasParams {
    /// 1-based page (default 1)
    pub page: Option<u32>,
    /// Page size (default 20, max 100)
    pub limit: Option<u32>,
    /// Case-insensitive substring over number, name, student code, program
    /// and identifier
    pub search: Option<String>,
}

impl From<ListDiplomasParams> for DiplomaListFilter {
    fn from(params: ListDiplomasParams) -> Self {
        DiplomaListFilter::new(params.page, params.limit, params.search)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_missing_data() {
        let json = serde_json::to_value(ApiResponse::<u32>::message("Logged out")).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "message": "Logged out" }));

        let json = serde_json::to_value(ApiResponse::ok("ok", 7)).unwrap();
        assert_eq!(json["data"], 7);
    }

    #[test]
    fn test_list_params_apply_defaults_and_cap() {
        let filter: DiplomaListFilter = ListDiplomasParams {
            page: None,
            limit: Some(500),
            search: Some("  ".to_string()),
        }
        .into();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.limit, 100);
        assert!(filter.search.is_none());
    }
}
