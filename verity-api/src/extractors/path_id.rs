//! Record id path extractor.
//!
//! Unlike the standard `Path<Uuid>` extractor, a malformed id is reported
//! as an `INVALID_FORMAT` error in the usual `{success: false, ...}` body.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use uuid::Uuid;

use crate::error::ApiError;

/// Record id taken from the single `:id` path parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for PathId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(raw) = Path::<String>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::invalid_input(format!("Invalid path parameter: {}", e)))?;

        Uuid::parse_str(raw.trim())
            .map(PathId)
            .map_err(|_| ApiError::invalid_format("id", "UUID"))
    }
}
