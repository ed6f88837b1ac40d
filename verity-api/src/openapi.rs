//! OpenAPI Specification for Verity API
//!
//! The document is generated by utoipa from the route annotations and the
//! schema derives on request and response types.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use verity_core::{
    AdminAction, AdminActionLogEntry, DiplomaField, DiplomaFields, DiplomaInput, DiplomaPage,
    DiplomaRecord, PublicDiploma, SearchSummary, TopSearched,
};

use crate::auth::{AdminPrincipal, DEFAULT_COOKIE_NAME};
use crate::db::PoolGauges;
use crate::error::{ErrorBody, ErrorCode};
use crate::routes::health::{ComponentHealth, HealthDetails, HealthResponse, HealthStatus};
use crate::routes::{auth, diploma, health, import, search, stats};
use crate::services::{
    ImportReport, ProcessInfo, RowError, RowRejection, SearchQuery, StatsActionRequest,
    StatsSnapshot,
};
use crate::types::{LoginRequest, SessionResponse};

/// OpenAPI document for Verity API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Verity API",
        version = "0.3.0",
        description = "Diploma registry: public verification lookup, admin record management and bulk spreadsheet import",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local Development")
    ),
    tags(
        (name = "Search", description = "Public diploma lookup by number or by student details"),
        (name = "Auth", description = "Administrator sessions"),
        (name = "Diplomas", description = "Diploma record management"),
        (name = "Import", description = "Bulk import from spreadsheets"),
        (name = "Stats", description = "Operational statistics and cache maintenance"),
        (name = "Health", description = "Liveness and readiness probes"),
        (name = "Observability", description = "Prometheus metrics")
    ),
    paths(
        // Search
        search::search_diploma,

        // Auth
        auth::login,
        auth::logout,
        auth::me,

        // Diplomas
        diploma::list_diplomas,
        diploma::create_diploma,
        diploma::get_diploma,
        diploma::update_diploma,
        diploma::delete_diploma,
        diploma::diploma_history,

        // Import
        import::import_diplomas,
        import::download_template,

        // Stats
        stats::get_stats,
        stats::apply_stats_action,

        // Health
        health::ping,
        health::liveness,
        health::readiness,

        // Observability
        crate::telemetry::metrics::metrics_handler,
    ),
    components(
        schemas(
            // === Error Types ===
            ErrorBody, ErrorCode,

            // === Diploma Types ===
            DiplomaField, DiplomaInput, DiplomaFields, DiplomaRecord, PublicDiploma, DiplomaPage,

            // === Audit Types ===
            AdminAction, AdminActionLogEntry,

            // === Search Types ===
            SearchQuery,

            // === Auth Types ===
            LoginRequest, SessionResponse, AdminPrincipal,

            // === Import Types ===
            ImportReport, RowError, RowRejection,

            // === Stats Types ===
            StatsSnapshot, StatsActionRequest, ProcessInfo, SearchSummary, TopSearched, PoolGauges,

            // === Health Types ===
            HealthResponse, HealthStatus, HealthDetails, ComponentHealth
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Security scheme modifier for OpenAPI document.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            // Session token in an HttpOnly cookie
            components.add_security_scheme(
                "session_cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::new(DEFAULT_COOKIE_NAME))),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        let openapi = Self::openapi();
        serde_json::to_string_pretty(&openapi)
    }
}
