//! Search Service
//!
//! Public diploma lookup. Per request, in order:
//! verification gate, input validation, search quota, cache, storage, and
//! exactly one search log row for every request that reached the cache.

use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use verity_core::{
    Clock, ComboQuery, DiplomaLookup, PublicDiploma, SearchLogEntry, ValidationError,
    VerityResult,
};
use verity_storage::{RegistryStore, TtlCache};

use crate::error::{ApiError, ApiResult};
use crate::services::rate_limit::{RateLimitDecision, RateLimiter};
use crate::services::verification::VerificationOutcome;
use crate::telemetry::metrics;

/// Search request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchQuery {
    /// `by-number` (default) or `by-combo`
    #[serde(default)]
    pub mode: Option<String>,
    #[serde(default)]
    pub document_number: Option<String>,
    #[serde(default)]
    pub student_code: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    /// ISO date (`YYYY-MM-DD`)
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    /// Human verification token
    #[serde(default)]
    pub captcha_token: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl SearchQuery {
    /// Validate the shape of the request.
    pub fn to_lookup(&self) -> Result<DiplomaLookup, ValidationError> {
        let mode = self
            .mode
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or("by-number");

        match mode {
            "by-number" => {
                let document_number = non_blank(self.document_number.as_deref()).ok_or(
                    ValidationError::RequiredFieldMissing {
                        field: "document_number".to_string(),
                    },
                )?;
                Ok(DiplomaLookup::ByNumber { document_number })
            }
            "by-combo" => {
                let student_code = non_blank(self.student_code.as_deref()).ok_or(
                    ValidationError::RequiredFieldMissing {
                        field: "student_code".to_string(),
                    },
                )?;
                let full_name = non_blank(self.full_name.as_deref());
                if full_name.is_none() && self.birth_date.is_none() {
                    return Err(ValidationError::InvalidValue {
                        field: "full_name".to_string(),
                        reason: "provide full_name or birth_date with student_code".to_string(),
                    });
                }
                Ok(DiplomaLookup::ByCombo(ComboQuery {
                    student_code,
                    full_name,
                    birth_date: self.birth_date,
                }))
            }
            other => Err(ValidationError::InvalidValue {
                field: "mode".to_string(),
                reason: format!("unknown search mode '{other}'"),
            }),
        }
    }
}

/// Who is asking.
#[derive(Debug, Clone, Default)]
pub struct SearchContext {
    pub client_address: String,
    pub user_agent: Option<String>,
}

/// Successful lookup (found or not).
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub diploma: Option<PublicDiploma>,
    pub cached: bool,
    pub quota: RateLimitDecision,
}

#[derive(Clone)]
pub struct SearchService {
    storage: Arc<dyn RegistryStore>,
    cache: Arc<TtlCache<PublicDiploma>>,
    limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl SearchService {
    pub fn new(
        storage: Arc<dyn RegistryStore>,
        cache: Arc<TtlCache<PublicDiploma>>,
        limiter: RateLimiter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            cache,
            limiter,
            clock,
        }
    }

    pub async fn search(
        &self,
        query: &SearchQuery,
        verification: VerificationOutcome,
        ctx: &SearchContext,
    ) -> ApiResult<SearchOutcome> {
        let started = Instant::now();

        if matches!(
            verification,
            VerificationOutcome::Rejected { .. } | VerificationOutcome::Error { .. }
        ) {
            self.log_verification_failure(query, &verification, ctx, started)
                .await;
            record_metric(query.mode.as_deref().unwrap_or("by-number"), "verification_failed");
            return Err(match verification.into_result() {
                Err(e) => e.into(),
                Ok(()) => ApiError::verification_failed(),
            });
        }

        let lookup = self.validate(query)?;
        let mode = lookup.mode();

        let quota = match self.limiter.check(&ctx.client_address).await {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    client = %ctx.client_address,
                    "Search quota unavailable, failing open"
                );
                self.limiter.fail_open()
            }
        };
        if !quota.allowed {
            record_metric(mode, "rate_limited");
            let retry_after = quota.retry_after_secs(self.clock.now());
            return Err(ApiError::too_many_requests(Some(retry_after)).with_details(
                serde_json::json!({
                    "limit": quota.limit,
                    "remaining": quota.remaining,
                    "reset_at": quota.reset_at,
                }),
            ));
        }

        let key = lookup.cache_key();
        let (diploma, cached, storage_error) = match self.cache.get(&key) {
            Some(hit) => (Some(hit), true, None),
            None => match self.find(&lookup).await {
                Ok(found) => {
                    if let Some(diploma) = &found {
                        self.cache.set(key, diploma.clone());
                    }
                    (found, false, None)
                }
                Err(e) => (None, false, Some(e)),
            },
        };

        let mut entry = SearchLogEntry::new(ctx.client_address.clone(), self.clock.now());
        entry.user_agent = ctx.user_agent.clone();
        entry.found = diploma.is_some();
        entry.verification_score = verification.score();
        entry.verification_status = Some(verification.status().to_string());
        entry.error = storage_error.as_ref().map(|e| e.to_string());
        let logged_number = match &lookup {
            DiplomaLookup::ByNumber { document_number } => Some(document_number.as_str()),
            DiplomaLookup::ByCombo(_) => diploma.as_ref().map(|d| d.document_number.as_str()),
        };
        entry = entry.with_document_number(logged_number);
        entry.latency_ms = elapsed_ms(started);
        self.append_log(&entry).await;

        if let Some(metrics) = metrics() {
            metrics.set_cache_hit_ratio(self.cache.stats().hit_rate);
        }

        if let Some(e) = storage_error {
            record_metric(mode, "error");
            return Err(e.into());
        }

        let outcome = match (&diploma, cached) {
            (_, true) => "cached",
            (Some(_), false) => "found",
            (None, false) => "not_found",
        };
        record_metric(mode, outcome);
        tracing::info!(
            mode,
            found = diploma.is_some(),
            cached,
            latency_ms = entry.latency_ms,
            "Diploma lookup"
        );

        Ok(SearchOutcome {
            diploma,
            cached,
            quota,
        })
    }

    fn validate(&self, query: &SearchQuery) -> ApiResult<DiplomaLookup> {
        query.to_lookup().map_err(ApiError::from)
    }

    async fn find(&self, lookup: &DiplomaLookup) -> VerityResult<Option<PublicDiploma>> {
        let record = match lookup {
            DiplomaLookup::ByNumber { document_number } => {
                self.storage.diploma_find_by_number(document_number).await?
            }
            DiplomaLookup::ByCombo(combo) => self.storage.diploma_find_by_combo(combo).await?,
        };
        Ok(record.as_ref().map(PublicDiploma::from))
    }

    async fn log_verification_failure(
        &self,
        query: &SearchQuery,
        verification: &VerificationOutcome,
        ctx: &SearchContext,
        started: Instant,
    ) {
        let mut entry = SearchLogEntry::new(ctx.client_address.clone(), self.clock.now())
            .with_document_number(non_blank(query.document_number.as_deref()).as_deref());
        entry.user_agent = ctx.user_agent.clone();
        entry.verification_score = verification.score();
        entry.verification_status = Some(verification.status().to_string());
        if let VerificationOutcome::Error { reason } = verification {
            entry.error = Some(reason.clone());
        }
        entry.latency_ms = elapsed_ms(started);
        self.append_log(&entry).await;
    }

    async fn append_log(&self, entry: &SearchLogEntry) {
        if let Err(e) = self.storage.search_log_append(entry).await {
            tracing::warn!(error = %e, "Failed to write search log");
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}

fn record_metric(mode: &str, outcome: &str) {
    if let Some(metrics) = metrics() {
        metrics.record_search(mode, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::rate_limit::RateLimitConfig;
    use verity_core::ManualClock;
    use verity_storage::CacheConfig;
    use verity_test_utils::{fixtures, MockStorage};

    struct Harness {
        storage: MockStorage,
        clock: Arc<ManualClock>,
        service: SearchService,
    }

    fn harness() -> Harness {
        let storage = MockStorage::new();
        let clock = Arc::new(ManualClock::default());
        let store: Arc<dyn RegistryStore> = Arc::new(storage.clone());
        let cache = Arc::new(TtlCache::with_clock(CacheConfig::default(), clock.clone()));
        let limiter = RateLimiter::new(store.clone(), clock.clone(), RateLimitConfig::default());
        let service = SearchService::new(store, cache, limiter, clock.clone());
        Harness {
            storage,
            clock,
            service,
        }
    }

    fn ctx() -> SearchContext {
        SearchContext {
            client_address: "10.0.0.1".to_string(),
            user_agent: Some("test".to_string()),
        }
    }

    fn by_number(number: &str) -> SearchQuery {
        SearchQuery {
            mode: Some("by-number".to_string()),
            document_number: Some(number.to_string()),
            ..SearchQuery::default()
        }
    }

    #[test]
    fn test_query_validation() {
        assert!(SearchQuery::default().to_lookup().is_err());
        assert!(by_number("  ").to_lookup().is_err());

        let code_only = SearchQuery {
            mode: Some("by-combo".to_string()),
            student_code: Some("20IT001".to_string()),
            ..SearchQuery::default()
        };
        assert!(code_only.to_lookup().is_err());

        let bad_mode = SearchQuery {
            mode: Some("by-magic".to_string()),
            ..SearchQuery::default()
        };
        assert!(bad_mode.to_lookup().is_err());

        let lookup = by_number(" QH-1 ").to_lookup().unwrap();
        assert_eq!(
            lookup,
            DiplomaLookup::ByNumber {
                document_number: "QH-1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_found_then_cached_with_one_log_each() {
        let h = harness();
        h.storage
            .diploma_insert(&fixtures::sample_record("QH-1", "VB-2023-CNH-000001"))
            .await
            .unwrap();

        let first = h
            .service
            .search(&by_number("QH-1"), VerificationOutcome::Disabled, &ctx())
            .await
            .unwrap();
        assert!(!first.cached);
        assert_eq!(
            first.diploma.as_ref().map(|d| d.identifier.as_str()),
            Some("VB-2023-CNH-000001")
        );

        let second = h
            .service
            .search(&by_number("QH-1"), VerificationOutcome::Disabled, &ctx())
            .await
            .unwrap();
        assert!(second.cached);

        let logs = h.storage.search_logs().unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.found));
        assert_eq!(logs[0].document_number.as_deref(), Some("QH-1"));
        assert_eq!(logs[0].verification_status.as_deref(), Some("disabled"));
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let h = harness();
        let outcome = h
            .service
            .search(&by_number("QH-404"), VerificationOutcome::Disabled, &ctx())
            .await
            .unwrap();
        assert!(outcome.diploma.is_none());

        h.storage
            .diploma_insert(&fixtures::sample_record("QH-404", "VB-2023-CNH-000001"))
            .await
            .unwrap();
        let outcome = h
            .service
            .search(&by_number("QH-404"), VerificationOutcome::Disabled, &ctx())
            .await
            .unwrap();
        assert!(outcome.diploma.is_some());
        assert!(!outcome.cached);
    }

    #[tokio::test]
    async fn test_validation_failure_writes_no_log() {
        let h = harness();
        let result = h
            .service
            .search(&by_number(""), VerificationOutcome::Disabled, &ctx())
            .await;
        assert!(result.is_err());
        assert!(h.storage.search_logs().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_verification_is_logged_and_refused() {
        let h = harness();
        let err = h
            .service
            .search(
                &by_number("QH-1"),
                VerificationOutcome::Rejected { score: Some(0.1) },
                &ctx(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::VerificationFailed);

        let logs = h.storage.search_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].verification_status.as_deref(), Some("rejected"));
        assert_eq!(logs[0].verification_score, Some(0.1));
        assert!(!logs[0].found);
    }

    #[tokio::test]
    async fn test_quota_blocks_without_logging() {
        let h = harness();
        for _ in 0..30 {
            h.service
                .search(&by_number("QH-1"), VerificationOutcome::Disabled, &ctx())
                .await
                .unwrap();
        }
        let err = h
            .service
            .search(&by_number("QH-1"), VerificationOutcome::Disabled, &ctx())
            .await
            .unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::TooManyRequests);
        assert!(err.retry_after_secs.is_some());
        assert_eq!(h.storage.search_logs().unwrap().len(), 30);

        h.clock.advance(chrono::Duration::seconds(3601));
        assert!(h
            .service
            .search(&by_number("QH-1"), VerificationOutcome::Disabled, &ctx())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_quota_fails_open_when_count_fails() {
        let h = harness();
        h.storage.fail_search_log_count(true);

        let outcome = h
            .service
            .search(&by_number("QH-1"), VerificationOutcome::Disabled, &ctx())
            .await
            .unwrap();
        assert!(outcome.quota.allowed);
        assert_eq!(outcome.quota.limit, 1000);
    }

    #[tokio::test]
    async fn test_log_write_failure_does_not_fail_request() {
        let h = harness();
        h.storage.fail_search_log_append(true);
        let outcome = h
            .service
            .search(&by_number("QH-1"), VerificationOutcome::Disabled, &ctx())
            .await;
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn test_combo_lookup_logs_found_number() {
        let h = harness();
        h.storage
            .diploma_insert(&fixtures::sample_record("QH-7", "VB-2023-CNH-000001"))
            .await
            .unwrap();

        let query = SearchQuery {
            mode: Some("by-combo".to_string()),
            student_code: Some("20IT001".to_string()),
            full_name: Some("NGUYỄN VĂN AN".to_string()),
            ..SearchQuery::default()
        };
        let outcome = h
            .service
            .search(&query, VerificationOutcome::Disabled, &ctx())
            .await
            .unwrap();
        assert!(outcome.diploma.is_some());

        let miss = SearchQuery {
            full_name: None,
            birth_date: NaiveDate::from_ymd_opt(1999, 1, 1),
            ..query
        };
        let outcome = h
            .service
            .search(&miss, VerificationOutcome::Disabled, &ctx())
            .await
            .unwrap();
        assert!(outcome.diploma.is_none());

        let logs = h.storage.search_logs().unwrap();
        assert_eq!(logs[0].document_number.as_deref(), Some("QH-7"));
        assert_eq!(logs[1].document_number, None);
    }
}
