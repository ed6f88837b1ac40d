//! Diploma REST Routes
//!
//! Admin CRUD over diploma records, mounted under `/api/v1/admin/diplomas`.
//! All handlers require an authenticated administrator.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use verity_core::{AdminActionLogEntry, DiplomaInput, DiplomaPage, DiplomaRecord};

use crate::error::ApiResult;
use crate::extractors::{ApiJson, PathId};
use crate::middleware::{AdminExtractor, ClientAddress};
use crate::services::{AuditContext, DiplomaService};
use crate::state::AppState;
use crate::types::{ApiResponse, ListDiplomasParams};

fn audit_context(admin: &AdminExtractor, client: ClientAddress) -> AuditContext {
    AuditContext::new(admin.username.clone(), client.0)
}

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// GET /api/v1/admin/diplomas - List active diplomas, newest first
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/admin/diplomas",
    tag = "Diplomas",
    params(ListDiplomasParams),
    responses(
        (status = 200, description = "One page of active diplomas", body = ApiResponse<DiplomaPage>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn list_diplomas(
    State(diplomas): State<DiplomaService>,
    Query(params): Query<ListDiplomasParams>,
) -> ApiResult<impl IntoResponse> {
    let page = diplomas.list(&params.into()).await?;
    Ok(ApiResponse::ok("Diplomas retrieved", page))
}

/// POST /api/v1/admin/diplomas - Register a new diploma
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/admin/diplomas",
    tag = "Diplomas",
    request_body = DiplomaInput,
    responses(
        (status = 201, description = "Diploma created", body = ApiResponse<DiplomaRecord>),
        (status = 400, description = "Missing or malformed field", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 409, description = "Document number already registered", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn create_diploma(
    State(diplomas): State<DiplomaService>,
    admin: AdminExtractor,
    client: ClientAddress,
    ApiJson(input): ApiJson<DiplomaInput>,
) -> ApiResult<impl IntoResponse> {
    let actor = audit_context(&admin, client);
    let record = diplomas.create(input, &actor).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok("Diploma created", record)))
}

/// GET /api/v1/admin/diplomas/{id} - Fetch one record, active or not
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/admin/diplomas/{id}",
    tag = "Diplomas",
    params(
        ("id" = String, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Diploma record", body = ApiResponse<DiplomaRecord>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 404, description = "Diploma not found", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn get_diploma(
    State(diplomas): State<DiplomaService>,
    PathId(id): PathId,
) -> ApiResult<impl IntoResponse> {
    let record = diplomas.get(id).await?;
    Ok(ApiResponse::ok("Diploma retrieved", record))
}

/// PUT /api/v1/admin/diplomas/{id} - Replace the fields of a record
#[cfg_attr(feature = "openapi", utoipa::path(
    put,
    path = "/api/v1/admin/diplomas/{id}",
    tag = "Diplomas",
    params(
        ("id" = String, Path, description = "Record ID")
    ),
    request_body = DiplomaInput,
    responses(
        (status = 200, description = "Diploma updated", body = ApiResponse<DiplomaRecord>),
        (status = 400, description = "Missing or malformed field", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 404, description = "Diploma not found", body = crate::error::ErrorBody),
        (status = 409, description = "Document number used by another active record", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn update_diploma(
    State(diplomas): State<DiplomaService>,
    admin: AdminExtractor,
    client: ClientAddress,
    PathId(id): PathId,
    ApiJson(input): ApiJson<DiplomaInput>,
) -> ApiResult<impl IntoResponse> {
    let actor = audit_context(&admin, client);
    let record = diplomas.update(id, input, &actor).await?;
    Ok(ApiResponse::ok("Diploma updated", record))
}

/// DELETE /api/v1/admin/diplomas/{id} - Deactivate a record
#[cfg_attr(feature = "openapi", utoipa::path(
    delete,
    path = "/api/v1/admin/diplomas/{id}",
    tag = "Diplomas",
    params(
        ("id" = String, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Diploma deactivated", body = ApiResponse<DiplomaRecord>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 404, description = "Diploma not found", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn delete_diploma(
    State(diplomas): State<DiplomaService>,
    admin: AdminExtractor,
    client: ClientAddress,
    PathId(id): PathId,
) -> ApiResult<impl IntoResponse> {
    let actor = audit_context(&admin, client);
    let record = diplomas.delete(id, &actor).await?;
    Ok(ApiResponse::ok("Diploma deleted", record))
}

/// GET /api/v1/admin/diplomas/{id}/history - Audit trail of a record
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/admin/diplomas/{id}/history",
    tag = "Diplomas",
    params(
        ("id" = String, Path, description = "Record ID")
    ),
    responses(
        (status = 200, description = "Audit entries, newest first", body = ApiResponse<Vec<AdminActionLogEntry>>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 404, description = "Diploma not found", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn diploma_history(
    State(diplomas): State<DiplomaService>,
    PathId(id): PathId,
) -> ApiResult<impl IntoResponse> {
    let entries = diplomas.history(id).await?;
    Ok(ApiResponse::ok("History retrieved", entries))
}

// ============================================================================
// ROUTER SETUP
// ============================================================================

/// Create the diploma router (mounted under `/api/v1/admin/diplomas`).
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_diplomas).post(create_diploma))
        .route(
            "/:id",
            get(get_diploma).put(update_diploma).delete(delete_diploma),
        )
        .route("/:id/history", get(diploma_history))
}
