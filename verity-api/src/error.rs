//! Error Types for Verity API
//!
//! This module defines error handling for the HTTP layer:
//! - ErrorCode enum for categorizing errors
//! - ApiError struct carried through handlers
//! - IntoResponse rendering the `{success: false, message, ...}` envelope
//!
//! Error codes are only written into responses when the service runs in a
//! development environment (`VERITY_ENVIRONMENT`).

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use verity_core::{StorageError, ValidationError, VerificationError, VerityError};

/// Message shown for every storage-class failure.
pub const STORAGE_UNAVAILABLE_MESSAGE: &str =
    "Service temporarily unavailable, please try again later";

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Authentication token is invalid or malformed
    InvalidToken,

    /// Authentication token has expired
    TokenExpired,

    /// Username or password did not match
    InvalidCredentials,

    // ========================================================================
    // Validation Errors (400, 413)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    /// Field format is incorrect
    InvalidFormat,

    /// Uploaded file is not a readable spreadsheet
    UnsupportedFile,

    /// Uploaded file exceeds the size limit
    PayloadTooLarge,

    /// Anti-automation check rejected the request
    VerificationFailed,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Requested diploma does not exist
    DiplomaNotFound,

    // ========================================================================
    // Conflict Errors (409)
    // ========================================================================
    /// Another record already uses this document number
    DuplicateDocumentNumber,

    /// Entity with the same key already exists
    EntityAlreadyExists,

    // ========================================================================
    // Server Errors (500, 503, 504)
    // ========================================================================
    /// Internal server error
    InternalError,

    /// Database operation failed
    DatabaseError,

    /// Service is temporarily unavailable
    ServiceUnavailable,

    /// Database connection pool exhausted
    ConnectionPoolExhausted,

    /// Operation timed out
    Timeout,

    /// Request rate limit exceeded
    TooManyRequests,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized
            | ErrorCode::InvalidToken
            | ErrorCode::TokenExpired
            | ErrorCode::InvalidCredentials => StatusCode::UNAUTHORIZED,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField
            | ErrorCode::InvalidFormat
            | ErrorCode::UnsupportedFile
            | ErrorCode::VerificationFailed => StatusCode::BAD_REQUEST,

            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,

            ErrorCode::EntityNotFound | ErrorCode::DiplomaNotFound => StatusCode::NOT_FOUND,

            ErrorCode::DuplicateDocumentNumber | ErrorCode::EntityAlreadyExists => {
                StatusCode::CONFLICT
            }

            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::InvalidToken => "Invalid authentication token",
            ErrorCode::TokenExpired => "Authentication token has expired",
            ErrorCode::InvalidCredentials => "Invalid username or password",

            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::InvalidFormat => "Invalid format",
            ErrorCode::UnsupportedFile => "Unsupported file format",
            ErrorCode::PayloadTooLarge => "File is too large",
            ErrorCode::VerificationFailed => "Verification failed, please try again",

            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::DiplomaNotFound => "Diploma not found",

            ErrorCode::DuplicateDocumentNumber => "Document number already exists",
            ErrorCode::EntityAlreadyExists => "Entity already exists",

            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ServiceUnavailable => STORAGE_UNAVAILABLE_MESSAGE,
            ErrorCode::ConnectionPoolExhausted => STORAGE_UNAVAILABLE_MESSAGE,
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::TooManyRequests => "Too many requests, please try again later",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Error returned by every handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details (missing fields, limits, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Seconds a rate-limited client should wait.
    #[serde(skip)]
    pub retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidToken, message)
    }

    pub fn token_expired() -> Self {
        Self::from_code(ErrorCode::TokenExpired)
    }

    pub fn invalid_credentials() -> Self {
        Self::from_code(ErrorCode::InvalidCredentials)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
        .with_details(serde_json::json!({ "field": field }))
    }

    /// Create an InvalidFormat error.
    pub fn invalid_format(field: &str, expected: &str) -> Self {
        Self::new(
            ErrorCode::InvalidFormat,
            format!("Field '{}' has invalid format, expected {}", field, expected),
        )
    }

    pub fn unsupported_file(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedFile, message)
    }

    pub fn verification_failed() -> Self {
        Self::from_code(ErrorCode::VerificationFailed)
    }

    pub fn diploma_not_found() -> Self {
        Self::from_code(ErrorCode::DiplomaNotFound)
    }

    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn duplicate_document_number(document_number: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateDocumentNumber,
            format!("Document number '{}' already exists", document_number),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }

    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }

    /// Create a TooManyRequests error carrying its retry delay.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let mut err = Self::from_code(ErrorCode::TooManyRequests);
        err.retry_after_secs = retry_after_secs;
        err
    }

    /// Response body, with the code only when `expose_code` is set.
    pub fn to_body(&self, expose_code: bool) -> ErrorBody {
        ErrorBody {
            success: false,
            message: self.message.clone(),
            code: expose_code.then_some(self.code),
            details: self.details.clone(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// RESPONSE ENVELOPE
// ============================================================================

/// Error envelope written to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    /// Always false
    pub success: bool,
    pub message: String,
    /// Only present in development environments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

/// Whether an environment name counts as development.
pub fn is_development_environment(environment: &str) -> bool {
    matches!(
        environment.trim().to_ascii_lowercase().as_str(),
        "development" | "dev" | "local" | "test"
    )
}

static EXPOSE_ERROR_CODES: Lazy<bool> = Lazy::new(|| {
    std::env::var("VERITY_ENVIRONMENT")
        .map(|env| is_development_environment(&env))
        .unwrap_or(false)
});

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let retry_after = self.retry_after_secs;
        let mut response = (status, Json(self.to_body(*EXPOSE_ERROR_CODES))).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Storage error");
        match err {
            StorageError::NotFound { entity, id } => ApiError::entity_not_found(&entity, id),
            StorageError::PoolTimeout => ApiError::connection_pool_exhausted(),
            StorageError::UniqueViolation { .. } => {
                ApiError::from_code(ErrorCode::EntityAlreadyExists)
            }
            _ => ApiError::service_unavailable(STORAGE_UNAVAILABLE_MESSAGE),
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(&field),
            ValidationError::RequiredFieldsMissing { ref fields } => {
                ApiError::new(ErrorCode::MissingField, err.to_string())
                    .with_details(serde_json::json!({ "fields": fields }))
            }
            ValidationError::InvalidValue { ref field, .. } => {
                ApiError::new(ErrorCode::InvalidFormat, err.to_string())
                    .with_details(serde_json::json!({ "field": field }))
            }
            ValidationError::DuplicateDocumentNumber { document_number } => {
                ApiError::duplicate_document_number(&document_number)
            }
            ValidationError::UnsupportedFile { .. } => ApiError::unsupported_file(err.to_string()),
            ValidationError::FileTooLarge { size, max } => {
                ApiError::new(ErrorCode::PayloadTooLarge, err.to_string())
                    .with_details(serde_json::json!({ "size": size, "max": max }))
            }
            ValidationError::TooManyRows { rows, max } => {
                ApiError::validation_failed(err.to_string())
                    .with_details(serde_json::json!({ "rows": rows, "max": max }))
            }
            ValidationError::NoDataRows => ApiError::validation_failed(err.to_string()),
        }
    }
}

impl From<VerificationError> for ApiError {
    fn from(err: VerificationError) -> Self {
        match err {
            VerificationError::Rejected { .. } => ApiError::verification_failed(),
            VerificationError::Upstream { reason } => {
                tracing::error!(%reason, "Verification service error");
                ApiError::service_unavailable(STORAGE_UNAVAILABLE_MESSAGE)
            }
        }
    }
}

impl From<VerityError> for ApiError {
    fn from(err: VerityError) -> Self {
        match err {
            VerityError::Storage(e) => e.into(),
            VerityError::Validation(e) => e.into(),
            VerityError::Verification(e) => e.into(),
            VerityError::Config(e) => {
                tracing::error!(error = %e, "Configuration error");
                ApiError::internal_error("Server misconfigured")
            }
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

/// Convert from uuid::Error to ApiError.
impl From<uuid::Error> for ApiError {
    fn from(err: uuid::Error) -> Self {
        ApiError::invalid_format("id", &format!("valid UUID: {}", err))
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::ValidationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::VerificationFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::PayloadTooLarge.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ErrorCode::DiplomaNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::DuplicateDocumentNumber.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::ServiceUnavailable.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorCode::Timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_storage_errors_are_generic() {
        let err: ApiError = VerityError::from(StorageError::QueryFailed {
            reason: "relation \"diplomas\" does not exist".to_string(),
        })
        .into();
        assert_eq!(err.code, ErrorCode::ServiceUnavailable);
        assert_eq!(err.message, STORAGE_UNAVAILABLE_MESSAGE);
        assert!(!err.message.contains("relation"));
    }

    #[test]
    fn test_validation_mapping() {
        let err: ApiError = ValidationError::RequiredFieldMissing {
            field: "full_name".to_string(),
        }
        .into();
        assert_eq!(err.code, ErrorCode::MissingField);
        assert!(err.message.contains("full_name"));

        let err: ApiError = ValidationError::FileTooLarge {
            size: 6_000_000,
            max: 5_242_880,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);

        let err: ApiError = ValidationError::DuplicateDocumentNumber {
            document_number: "QH-1".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_body_hides_code_outside_development() -> Result<(), serde_json::Error> {
        let err = ApiError::diploma_not_found();

        let hidden = serde_json::to_value(err.to_body(false))?;
        assert_eq!(hidden["success"], false);
        assert_eq!(hidden["message"], "Diploma not found");
        assert!(hidden.get("code").is_none());

        let shown = serde_json::to_value(err.to_body(true))?;
        assert_eq!(shown["code"], "DIPLOMA_NOT_FOUND");
        Ok(())
    }

    #[test]
    fn test_development_environment_names() {
        assert!(is_development_environment("development"));
        assert!(is_development_environment(" Dev "));
        assert!(!is_development_environment("production"));
        assert!(!is_development_environment("staging"));
    }

    #[test]
    fn test_too_many_requests_sets_retry_after() {
        let response = ApiError::too_many_requests(Some(42)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok()),
            Some("42")
        );
    }
}
