//! Stats Service
//!
//! Operational snapshot for administrators: cache counters, search
//! aggregates, most searched numbers, pool gauges and process metadata.

use std::sync::Arc;
use std::time::Instant;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use verity_core::{Clock, PublicDiploma, SearchSummary, Timestamp, TopSearched};
use verity_storage::{CacheStats, RegistryStore, TtlCache};

use crate::db::{DbClient, PoolGauges};
use crate::error::{ApiError, ApiResult};

/// Only mutation the stats endpoint accepts.
pub const CLEAR_CACHE_ACTION: &str = "clear_cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProcessInfo {
    pub version: String,
    pub uptime_secs: u64,
    pub pid: u32,
    pub environment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StatsSnapshot {
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub cache: CacheStats,
    pub searches_24h: SearchSummary,
    pub searches_7d: SearchSummary,
    /// Most searched document numbers over the last 7 days.
    pub top_searched: Vec<TopSearched>,
    /// Absent when running without PostgreSQL.
    pub pool: Option<PoolGauges>,
    pub process: ProcessInfo,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub generated_at: Timestamp,
}

/// Body of `POST /api/v1/admin/stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StatsActionRequest {
    pub action: String,
}

#[derive(Clone)]
pub struct StatsService {
    storage: Arc<dyn RegistryStore>,
    cache: Arc<TtlCache<PublicDiploma>>,
    db: Option<DbClient>,
    clock: Arc<dyn Clock>,
    started: Instant,
    top_n: usize,
    environment: String,
}

impl StatsService {
    pub fn new(
        storage: Arc<dyn RegistryStore>,
        cache: Arc<TtlCache<PublicDiploma>>,
        db: Option<DbClient>,
        clock: Arc<dyn Clock>,
        top_n: usize,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            cache,
            db,
            clock,
            started: Instant::now(),
            top_n,
            environment: environment.into(),
        }
    }

    /// Count uptime from `started` instead of construction time.
    pub fn with_start_time(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    pub async fn snapshot(&self) -> ApiResult<StatsSnapshot> {
        let now = self.clock.now();
        let last_week = now - Duration::days(7);

        let searches_24h = self.storage.search_log_summary(now - Duration::hours(24)).await?;
        let searches_7d = self.storage.search_log_summary(last_week).await?;
        let top_searched = self
            .storage
            .search_log_top_numbers(last_week, self.top_n)
            .await?;

        Ok(StatsSnapshot {
            cache: self.cache.stats(),
            searches_24h,
            searches_7d,
            top_searched,
            pool: self.db.as_ref().map(DbClient::pool_gauges),
            process: ProcessInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                uptime_secs: self.started.elapsed().as_secs(),
                pid: std::process::id(),
                environment: self.environment.clone(),
            },
            generated_at: now,
        })
    }

    /// Run an admin action and return the stats after it.
    pub async fn apply(&self, action: &str) -> ApiResult<StatsSnapshot> {
        match action.trim() {
            CLEAR_CACHE_ACTION => {
                self.cache.clear();
                tracing::info!("Search cache cleared");
                self.snapshot().await
            }
            other => Err(ApiError::validation_failed(format!("Unknown action '{other}'"))
                .with_details(serde_json::json!({ "allowed": [CLEAR_CACHE_ACTION] }))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use verity_core::{ManualClock, SearchLogEntry};
    use verity_storage::CacheConfig;
    use verity_test_utils::{fixtures, MockStorage};

    fn service(storage: &MockStorage, clock: Arc<ManualClock>) -> (StatsService, Arc<TtlCache<PublicDiploma>>) {
        let cache = Arc::new(TtlCache::with_clock(CacheConfig::default(), clock.clone()));
        let service = StatsService::new(
            Arc::new(storage.clone()),
            cache.clone(),
            None,
            clock,
            10,
            "test",
        );
        (service, cache)
    }

    async fn log_search(storage: &MockStorage, at: Timestamp, number: &str, found: bool) {
        let mut entry = SearchLogEntry::new("10.0.0.1", at).with_document_number(Some(number));
        entry.found = found;
        entry.latency_ms = 10;
        storage.search_log_append(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_snapshot_windows_and_top_numbers() {
        let storage = MockStorage::new();
        let clock = Arc::new(ManualClock::default());
        let now = clock.now();

        log_search(&storage, now - Duration::days(3), "QH-1", true).await;
        log_search(&storage, now - Duration::hours(1), "QH-1", true).await;
        log_search(&storage, now - Duration::hours(2), "QH-2", false).await;
        log_search(&storage, now - Duration::days(9), "QH-3", true).await;

        let (service, _) = service(&storage, clock);
        let stats = service.snapshot().await.unwrap();

        assert_eq!(stats.searches_24h.total, 2);
        assert_eq!(stats.searches_7d.total, 3);
        assert_eq!(stats.searches_7d.found, 2);
        assert_eq!(stats.searches_7d.not_found, 1);
        assert_eq!(stats.top_searched[0].document_number, "QH-1");
        assert_eq!(stats.top_searched[0].count, 2);
        assert!(stats.pool.is_none());
        assert_eq!(stats.process.environment, "test");
        assert_eq!(stats.process.pid, std::process::id());
    }

    #[tokio::test]
    async fn test_clear_cache_resets_counters() {
        let storage = MockStorage::new();
        let clock = Arc::new(ManualClock::default());
        let (service, cache) = service(&storage, clock);

        let record = fixtures::sample_record("QH-1", "VB-2023-CNH-000001");
        cache.set("number:QH-1", PublicDiploma::from(&record));
        assert!(cache.get("number:QH-1").is_some());
        assert!(cache.get("number:QH-2").is_none());

        let stats = service.apply("clear_cache").await.unwrap();
        assert_eq!(stats.cache.size, 0);
        assert_eq!(stats.cache.total, 0);
        assert_eq!(stats.cache.hit_rate, 0.0);
    }

    #[tokio::test]
    async fn test_unknown_action_is_validation_error() {
        let storage = MockStorage::new();
        let (service, _) = service(&storage, Arc::new(ManualClock::default()));
        let err = service.apply("drop_everything").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }
}
