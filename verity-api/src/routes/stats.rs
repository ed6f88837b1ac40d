//! Operational stats for administrators.

use axum::{extract::State, response::IntoResponse, routing::get, Router};

use crate::error::ApiResult;
use crate::extractors::ApiJson;
use crate::middleware::AdminExtractor;
use crate::services::{StatsActionRequest, StatsService, StatsSnapshot};
use crate::state::AppState;
use crate::types::ApiResponse;

/// GET /api/v1/admin/stats - Cache, search and process stats
#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/api/v1/admin/stats",
    tag = "Stats",
    responses(
        (status = 200, description = "Stats snapshot", body = ApiResponse<StatsSnapshot>),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn get_stats(State(stats): State<StatsService>) -> ApiResult<impl IntoResponse> {
    let snapshot = stats.snapshot().await?;
    Ok(ApiResponse::ok("Stats retrieved", snapshot))
}

/// POST /api/v1/admin/stats - Run a maintenance action (`clear_cache`)
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/api/v1/admin/stats",
    tag = "Stats",
    request_body = StatsActionRequest,
    responses(
        (status = 200, description = "Action applied, stats after it", body = ApiResponse<StatsSnapshot>),
        (status = 400, description = "Unknown action", body = crate::error::ErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ErrorBody),
    ),
    security(("session_cookie" = []))
))]
pub async fn apply_stats_action(
    State(stats): State<StatsService>,
    AdminExtractor(admin): AdminExtractor,
    ApiJson(req): ApiJson<StatsActionRequest>,
) -> ApiResult<impl IntoResponse> {
    tracing::info!(admin = %admin.username, action = %req.action, "Stats action requested");
    let snapshot = stats.apply(&req.action).await?;
    Ok(ApiResponse::ok(format!("Action '{}' applied", req.action.trim()), snapshot))
}

/// Create the stats router (mounted under `/api/v1/admin/stats`).
pub fn create_router() -> Router<AppState> {
    Router::new().route("/", get(get_stats).post(apply_stats_action))
}
