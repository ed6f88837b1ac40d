//! Public search quota.
//!
//! Counts the client's search log rows inside a sliding window. The count is
//! persisted, so the quota holds across restarts and replicas. Storage
//! failures are returned to the caller, which decides to fail open.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use verity_core::{Clock, Timestamp, VerityResult};
use verity_storage::RegistryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Searches allowed per window.
    pub max_requests: u32,
    pub window: Duration,
    /// Limit reported when the count could not be read.
    pub fail_open_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(3600),
            fail_open_limit: 1000,
        }
    }
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: Timestamp,
}

impl RateLimitDecision {
    /// Seconds until the window resets, at least one.
    pub fn retry_after_secs(&self, now: Timestamp) -> u64 {
        u64::try_from((self.reset_at - now).num_seconds())
            .unwrap_or(0)
            .max(1)
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    storage: Arc<dyn RegistryStore>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(
        storage: Arc<dyn RegistryStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.window)
            .unwrap_or_else(|_| chrono::Duration::hours(1))
    }

    pub async fn check(&self, client_address: &str) -> VerityResult<RateLimitDecision> {
        let now = self.clock.now();
        let window = self.window();
        let used = self
            .storage
            .search_log_count_since(client_address, now - window)
            .await?;

        let max = u64::from(self.config.max_requests);
        let remaining = u32::try_from(max.saturating_sub(used)).unwrap_or(u32::MAX);

        Ok(RateLimitDecision {
            allowed: used < max,
            limit: self.config.max_requests,
            remaining,
            reset_at: now + window,
        })
    }

    /// Permissive decision used when the count cannot be read.
    pub fn fail_open(&self) -> RateLimitDecision {
        RateLimitDecision {
            allowed: true,
            limit: self.config.fail_open_limit,
            remaining: self.config.fail_open_limit,
            reset_at: self.clock.now() + self.window(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_core::{ManualClock, SearchLogEntry};
    use verity_test_utils::{MockStorage, RegistryStore};

    fn limiter(storage: &MockStorage, clock: Arc<ManualClock>) -> RateLimiter {
        RateLimiter::new(
            Arc::new(storage.clone()),
            clock,
            RateLimitConfig::default(),
        )
    }

    async fn log_searches(storage: &MockStorage, clock: &ManualClock, address: &str, n: usize) {
        for _ in 0..n {
            storage
                .search_log_append(&SearchLogEntry::new(address, clock.now()))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_thirty_first_request_is_blocked() {
        let storage = MockStorage::new();
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(&storage, clock.clone());

        log_searches(&storage, &clock, "10.0.0.1", 29).await;
        let decision = limiter.check("10.0.0.1").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
        assert_eq!(decision.limit, 30);

        log_searches(&storage, &clock, "10.0.0.1", 1).await;
        let decision = limiter.check("10.0.0.1").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert_eq!(decision.reset_at, clock.now() + chrono::Duration::hours(1));

        // Other addresses are unaffected.
        assert!(limiter.check("10.0.0.2").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_allowed_again_after_window() {
        let storage = MockStorage::new();
        let clock = Arc::new(ManualClock::default());
        let limiter = limiter(&storage, clock.clone());

        log_searches(&storage, &clock, "10.0.0.1", 30).await;
        assert!(!limiter.check("10.0.0.1").await.unwrap().allowed);

        clock.advance(chrono::Duration::seconds(3601));
        let decision = limiter.check("10.0.0.1").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 30);
    }

    #[tokio::test]
    async fn test_storage_failure_is_returned() {
        let storage = MockStorage::new();
        storage.fail_search_log_count(true);
        let limiter = limiter(&storage, Arc::new(ManualClock::default()));

        assert!(limiter.check("10.0.0.1").await.is_err());

        let permissive = limiter.fail_open();
        assert!(permissive.allowed);
        assert_eq!(permissive.limit, 1000);
    }

    #[test]
    fn test_retry_after_is_at_least_one_second() {
        let clock = ManualClock::default();
        let decision = RateLimitDecision {
            allowed: false,
            limit: 30,
            remaining: 0,
            reset_at: clock.now(),
        };
        assert_eq!(decision.retry_after_secs(clock.now()), 1);
        assert_eq!(
            decision.retry_after_secs(clock.now() - chrono::Duration::seconds(90)),
            90
        );
    }
}
