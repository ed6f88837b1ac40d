//! Verity API Server Entry Point
//!
//! Bootstraps configuration, connects to PostgreSQL and starts the Axum
//! HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use verity_api::services::{build_verifier, VerificationConfig};
use verity_api::telemetry::{init_tracer, TelemetryConfig};
use verity_api::{
    create_api_router, ApiConfig, ApiError, ApiResult, AppState, AuthConfig, DbClient, DbConfig,
};

/// How often the idle connection reaper runs.
const REAPER_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production(&api_config.environment)?;

    let verification_config = VerificationConfig::from_env();
    verification_config
        .validate_for_production(&api_config.environment)
        .map_err(|e| ApiError::invalid_input(e.to_string()))?;
    let verifier = build_verifier(verification_config)
        .map_err(|e| ApiError::invalid_input(e.to_string()))?;

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;
    if db_config.run_migrations {
        db.run_migrations().await?;
    }
    db.warm_up(db_config.min_size).await?;
    let _reaper = db.spawn_idle_reaper(db_config.idle_timeout, db_config.min_size, REAPER_INTERVAL);

    let state = AppState::new(
        Arc::new(db.clone()),
        Some(db),
        api_config,
        auth_config,
        verifier,
    );
    let app: Router = create_api_router(state)?;

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Verity API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>());
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("VERITY_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("VERITY_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str.parse::<u16>().map_err(|_| {
        ApiError::invalid_input(format!("Invalid port value: {}", port_str))
    })?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>().map_err(|e| {
        ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
    })
}
