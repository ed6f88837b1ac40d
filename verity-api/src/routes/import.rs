//! Bulk import routes.
//!
//! - `POST /api/v1/admin/import`: multipart upload, field `file`
//! - `GET /api/v1/admin/import/template`: blank `.xlsx` with one example row

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::middleware::{AdminExtractor, ClientAddress};
use crate::services::{AuditContext, ImportFile, ImportReport, ImportService};
use crate::spreadsheet::{build_template, TEMPLATE_FILE_NAME, XLSX_CONTENT_TYPE};
use crate::state::AppState;
use crate::types::ApiResponse;

/// Multipart field carrying the workbook.
pub const FILE_FIELD: &str = "file";

/// Allowance for multipart framing above the file size limit.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::new(ErrorCode::PayloadTooLarge, "Uploaded file is too large")
    } else {
        ApiError::invalid_input(format!("Invalid multipart body: {}", err.body_text()))
    }
}

/// Pull the `file` field out of the upload.
async fn read_upload(multipart: &mut Multipart) -> ApiResult<ImportFile> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(ImportFile {
            file_name,
            bytes: bytes.to_vec(),
        });
    }
    Err(ApiError::missing_field(FILE_FIELD))
}

/// POST /api/v1/admin/import - Import diplomas from a spreadsheet
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/admin/import",
    tag = "Import",
    request_body(content = Vec<u8>, content_type = "multipart/form-data", description = "Workbook in field `file` (.xlsx, .xlsm, .xls, .ods)"),
    responses(
        (status = 200, description = "File processed; per-row failures are in the report", body = ApiResponse<ImportReport>),
        (status = 400, description = "Unsupported, empty or oversized sheet", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
        (status = 413, description = "File too large", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn import_diplomas(
    State(imports): State<ImportService>,
    admin: AdminExtractor,
    ClientAddress(client_address): ClientAddress,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let file = read_upload(&mut multipart).await?;
    let actor = AuditContext::new(admin.username.clone(), client_address);

    let report = imports.import(file, &actor).await?;
    let message = format!(
        "Imported {} of {} rows ({} failed)",
        report.success, report.total, report.failed
    );
    Ok(ApiResponse::ok(message, report))
}

/// GET /api/v1/admin/import/template - Download the import template
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/admin/import/template",
    tag = "Import",
    responses(
        (status = 200, description = "Template workbook", body = Vec<u8>, content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn download_template() -> ApiResult<Response> {
    let bytes = build_template().map_err(|e| {
        tracing::error!(error = %e, "Failed to build import template");
        ApiError::internal_error("Failed to build import template")
    })?;

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        TEMPLATE_FILE_NAME
    ))
    .map_err(|e| ApiError::internal_error(format!("Invalid header: {}", e)))?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(XLSX_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// Create the import router (mounted under `/api/v1/admin/import`).
///
/// The body limit follows the configured maximum file size.
pub fn create_router(max_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(import_diplomas))
        .route("/template", get(download_template))
        .layer(DefaultBodyLimit::max(
            max_bytes.saturating_add(MULTIPART_OVERHEAD),
        ))
}
