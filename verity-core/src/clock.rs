//! Clock abstraction.
//!
//! Cache expiry, rate-limit windows, log timestamps and token lifetimes all
//! read time through [`Clock`] so tests can move time explicitly instead of
//! sleeping.

use std::sync::Mutex;

use chrono::{Duration, Utc};

use crate::Timestamp;

/// Source of "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward for negative durations).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }

    pub fn set(&self, at: Timestamp) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now = at;
    }
}

impl Default for ManualClock {
    /// 2024-06-01 00:00:00 UTC.
    fn default() -> Self {
        Self::new(chrono::DateTime::<Utc>::from_timestamp(1_717_200_000, 0).unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now();
        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now() - start, Duration::minutes(5));
        assert_eq!(clock.now_epoch_secs(), start.timestamp() + 300);
    }

    #[test]
    fn test_system_clock_is_after_epoch() {
        assert!(SystemClock.now_epoch_secs() > 0);
    }
}
