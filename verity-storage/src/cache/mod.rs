//! In-memory TTL cache for public search results.
//!
//! Entries expire `ttl` after their last write. When a new key arrives at
//! capacity, the oldest *inserted* key is evicted; reads and re-writes do not
//! change an entry's position. Expired entries are dropped lazily on read.
//!
//! The cache is an ordinary value: construct one, wrap it in an `Arc` and
//! hand it to whoever needs it.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use verity_core::{Clock, SystemClock, Timestamp};

/// Default entry lifetime (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default number of entries kept.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Cache sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub size: usize,
    pub ttl_secs: u64,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
    /// Percentage, two decimals; 0 when nothing was looked up yet.
    pub hit_rate: f64,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Timestamp,
}

#[derive(Debug)]
struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Keys in insertion order. May hold keys already removed by expiry;
    /// those are skipped when evicting.
    order: VecDeque<String>,
}

/// Thread-safe TTL cache keyed by `String`.
pub struct TtlCache<V: Clone> {
    inner: Mutex<Inner<V>>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> std::fmt::Debug for TtlCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.config)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl<V: Clone> TtlCache<V> {
    /// Cache driven by the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            config,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    // Poisoned locks are reused; entries are plain values.
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Look up a live entry. Counts a hit or a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut inner = self.lock();

        let live = match inner.entries.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };
        drop(inner);

        match live {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value with a fresh expiry.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let ttl = chrono::Duration::from_std(self.config.ttl)
            .unwrap_or_else(|_| chrono::Duration::days(3650));
        let expires_at = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);

        let mut inner = self.lock();

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return;
        }

        if self.config.capacity == 0 {
            return;
        }

        while inner.entries.len() >= self.config.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
        }

        // A key that expired and is now re-inserted is still queued at its
        // old position; drop the stale slot so it moves to the back.
        if inner.order.len() > inner.entries.len() {
            let Inner { entries, order } = &mut *inner;
            order.retain(|k| entries.contains_key(k));
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Remove a single key.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.lock();
        if inner.entries.remove(key).is_some() {
            inner.order.retain(|k| k != key);
        }
    }

    /// Remove every entry whose value matches `predicate`, whatever its key.
    /// Returns the number of entries removed.
    pub fn invalidate_where(&self, mut predicate: impl FnMut(&V) -> bool) -> usize {
        let mut inner = self.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !predicate(&entry.value));
        let removed = before - inner.entries.len();
        if removed > 0 {
            let Inner { entries, order } = &mut *inner;
            order.retain(|k| entries.contains_key(k));
        }
        removed
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            ((hits as f64 / total as f64) * 10_000.0).round() / 100.0
        };

        CacheStats {
            size: self.len(),
            ttl_secs: self.config.ttl.as_secs(),
            capacity: self.config.capacity,
            hits,
            misses,
            total,
            hit_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use verity_core::ManualClock;

    fn cache_with_clock(capacity: usize) -> (TtlCache<u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let cache = TtlCache::with_clock(
            CacheConfig {
                ttl: Duration::from_secs(300),
                capacity,
            },
            clock.clone(),
        );
        (cache, clock)
    }

    #[test]
    fn test_set_then_get_hits() {
        let (cache, _) = cache_with_clock(10);
        cache.set("a", 1);
        assert_eq!(cache.get("a"), Some(1));
        assert_eq!(cache.get("b"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.hit_rate, 50.0);
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_removed() {
        let (cache, clock) = cache_with_clock(10);
        cache.set("a", 1);
        clock.advance(chrono::Duration::seconds(301));
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_eviction_is_insertion_ordered() {
        let (cache, _) = cache_with_clock(1000);
        for i in 0..1001u32 {
            cache.set(format!("k{i}"), i);
        }
        assert_eq!(cache.len(), 1000);
        assert_eq!(cache.get("k0"), None);
        assert_eq!(cache.get("k1"), Some(1));
        assert_eq!(cache.get("k1000"), Some(1000));
    }

    #[test]
    fn test_invalidate_where_matches_values_under_any_key() {
        let (cache, _) = cache_with_clock(10);
        cache.set("number:a", 1);
        cache.set("combo:a", 1);
        cache.set("number:b", 2);

        assert_eq!(cache.invalidate_where(|v| *v == 1), 2);
        assert_eq!(cache.get("number:a"), None);
        assert_eq!(cache.get("combo:a"), None);
        assert_eq!(cache.get("number:b"), Some(2));

        // Order bookkeeping stays consistent for later evictions.
        for i in 0..9u32 {
            cache.set(format!("k{i}"), 10 + i);
        }
        assert_eq!(cache.len(), 10);
        cache.set("k9", 19);
        assert_eq!(cache.get("number:b"), None);
    }

    #[test]
    fn test_reads_do_not_protect_from_eviction() {
        let (cache, _) = cache_with_clock(2);
        cache.set("a", 1);
        cache.set("b", 2);
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b"), Some(2));
    }

    #[test]
    fn test_reset_keeps_position_but_refreshes_expiry() {
        let (cache, clock) = cache_with_clock(2);
        cache.set("a", 1);
        cache.set("b", 2);
        clock.advance(chrono::Duration::seconds(200));
        cache.set("a", 10);
        clock.advance(chrono::Duration::seconds(200));
        // "a" was refreshed, "b" was not.
        assert_eq!(cache.get("a"), Some(10));
        assert_eq!(cache.get("b"), None);

        cache.set("c", 3);
        cache.set("d", 4);
        // "a" kept its original slot and is the oldest again.
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("c"), Some(3));
        assert_eq!(cache.get("d"), Some(4));
    }

    #[test]
    fn test_clear_resets_counters() {
        let (cache, _) = cache_with_clock(10);
        cache.set("a", 1);
        let _ = cache.get("a");
        let _ = cache.get("z");
        cache.clear();
        let stats = cache.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_hit_rate_rounds_to_two_decimals() {
        let (cache, _) = cache_with_clock(10);
        cache.set("a", 1);
        let _ = cache.get("a");
        let _ = cache.get("x");
        let _ = cache.get("y");
        assert_eq!(cache.stats().hit_rate, 33.33);
    }

    proptest! {
        #[test]
        fn prop_size_never_exceeds_capacity(
            capacity in 1usize..20,
            keys in proptest::collection::vec(0u8..40, 0..200),
        ) {
            let (cache, _) = cache_with_clock(capacity);
            for k in keys {
                cache.set(k.to_string(), u32::from(k));
                prop_assert!(cache.len() <= capacity);
            }
        }
    }
}
