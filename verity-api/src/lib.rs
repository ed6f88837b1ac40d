//! Verity API - REST layer of the diploma registry
//!
//! Exposes the public diploma search, administrator sessions, record
//! management, bulk spreadsheet import and operational stats over Axum.
//! Persistence goes through the `RegistryStore` trait: PostgreSQL via
//! [`DbClient`] in production, `MockStorage` in tests.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod macros;
pub mod middleware;
#[cfg(feature = "openapi")]
pub mod openapi;
pub mod routes;
pub mod services;
pub mod spreadsheet;
pub mod state;
pub mod telemetry;
pub mod types;

// Re-export commonly used types
pub use auth::{
    generate_jwt_token, hash_password, validate_jwt_token, verify_password, AdminPrincipal,
    AuthConfig, Claims, JwtSecret,
};
pub use config::ApiConfig;
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use middleware::{auth_middleware, AdminExtractor, ClientAddress};
#[cfg(feature = "openapi")]
pub use openapi::ApiDoc;
pub use routes::create_api_router;
pub use state::AppState;
pub use types::*;
