//! API Configuration Module
//!
//! Configuration for CORS, flood protection, the public search quota, the
//! result cache, bulk import limits and identifier generation. Values come
//! from environment variables with defaults suitable for development.

use std::str::FromStr;
use std::time::Duration;

use verity_core::DEFAULT_ORG_PREFIX;
use verity_storage::CacheConfig;

use crate::services::rate_limit::RateLimitConfig;

/// Issuing unit code applied to imported rows that leave it empty.
pub const DEFAULT_ISSUING_UNIT_CODE: &str = "DHQG";

/// Largest accepted import upload (5 MiB).
pub const DEFAULT_IMPORT_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Largest accepted number of data rows per import.
pub const DEFAULT_IMPORT_MAX_ROWS: usize = 1000;

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    /// Example: "https://tracuu.example.edu.vn,https://admin.example.edu.vn"
    pub cors_origins: Vec<String>,

    /// Whether to allow credentials in CORS requests.
    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Flood protection (all routes, in-process)
    // ========================================================================
    pub flood_limit_enabled: bool,

    /// Requests per minute per client address.
    pub flood_limit_per_minute: u32,

    /// Burst capacity above the per-minute rate.
    pub flood_limit_burst: u32,

    // ========================================================================
    // Public search quota (persisted search log)
    // ========================================================================
    pub search_rate_limit: u32,

    pub search_rate_window: Duration,

    /// Limit reported when the quota cannot be checked.
    pub search_fail_open_limit: u32,

    // ========================================================================
    // Result cache
    // ========================================================================
    pub cache_ttl: Duration,

    pub cache_capacity: usize,

    // ========================================================================
    // Bulk import
    // ========================================================================
    pub import_max_bytes: usize,

    pub import_max_rows: usize,

    /// Issuing unit code for imported rows without one.
    pub default_issuing_unit_code: String,

    // ========================================================================
    // Misc
    // ========================================================================
    /// Organization segment of generated identifiers.
    pub identifier_org: String,

    /// Whole-request timeout.
    pub request_timeout: Duration,

    /// Number of document numbers in the stats "top searched" list.
    pub stats_top_n: usize,

    /// Deployment environment name (development, staging, production).
    pub environment: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: 86400,

            flood_limit_enabled: true,
            flood_limit_per_minute: 120,
            flood_limit_burst: 20,

            search_rate_limit: 30,
            search_rate_window: Duration::from_secs(3600),
            search_fail_open_limit: 1000,

            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,

            import_max_bytes: DEFAULT_IMPORT_MAX_BYTES,
            import_max_rows: DEFAULT_IMPORT_MAX_ROWS,
            default_issuing_unit_code: DEFAULT_ISSUING_UNIT_CODE.to_string(),

            identifier_org: DEFAULT_ORG_PREFIX.to_string(),
            request_timeout: Duration::from_secs(120),
            stats_top_n: 10,
            environment: "production".to_string(),
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn flag_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|s| match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => true,
            "false" | "0" | "no" => false,
            _ => default,
        })
        .unwrap_or(default)
}

fn text_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `VERITY_CORS_ORIGINS`: Comma-separated allowed origins (empty = allow all)
    /// - `VERITY_CORS_ALLOW_CREDENTIALS`: "true" or "false" (default: false)
    /// - `VERITY_CORS_MAX_AGE_SECS`: Preflight cache duration (default: 86400)
    /// - `VERITY_FLOOD_LIMIT_ENABLED`, `_PER_MINUTE` (120), `_BURST` (20)
    /// - `VERITY_SEARCH_RATE_LIMIT` (30), `_WINDOW_SECS` (3600), `_FAIL_OPEN_LIMIT` (1000)
    /// - `VERITY_CACHE_TTL_SECS` (300), `VERITY_CACHE_CAPACITY` (1000)
    /// - `VERITY_IMPORT_MAX_BYTES` (5 MiB), `VERITY_IMPORT_MAX_ROWS` (1000)
    /// - `VERITY_DEFAULT_ISSUING_UNIT_CODE` (DHQG)
    /// - `VERITY_IDENTIFIER_ORG` (VB)
    /// - `VERITY_REQUEST_TIMEOUT_SECS` (120)
    /// - `VERITY_STATS_TOP_N` (10)
    /// - `VERITY_ENVIRONMENT` (production)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let cors_origins = lookup("VERITY_CORS_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            cors_origins,
            cors_allow_credentials: flag_or(
                &lookup,
                "VERITY_CORS_ALLOW_CREDENTIALS",
                defaults.cors_allow_credentials,
            ),
            cors_max_age_secs: parse_or(&lookup, "VERITY_CORS_MAX_AGE_SECS", defaults.cors_max_age_secs),

            flood_limit_enabled: flag_or(&lookup, "VERITY_FLOOD_LIMIT_ENABLED", defaults.flood_limit_enabled),
            flood_limit_per_minute: parse_or(
                &lookup,
                "VERITY_FLOOD_LIMIT_PER_MINUTE",
                defaults.flood_limit_per_minute,
            ),
            flood_limit_burst: parse_or(&lookup, "VERITY_FLOOD_LIMIT_BURST", defaults.flood_limit_burst),

            search_rate_limit: parse_or(&lookup, "VERITY_SEARCH_RATE_LIMIT", defaults.search_rate_limit),
            search_rate_window: Duration::from_secs(parse_or(
                &lookup,
                "VERITY_SEARCH_RATE_WINDOW_SECS",
                defaults.search_rate_window.as_secs(),
            )),
            search_fail_open_limit: parse_or(
                &lookup,
                "VERITY_SEARCH_RATE_FAIL_OPEN_LIMIT",
                defaults.search_fail_open_limit,
            ),

            cache_ttl: Duration::from_secs(parse_or(
                &lookup,
                "VERITY_CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )),
            cache_capacity: parse_or(&lookup, "VERITY_CACHE_CAPACITY", defaults.cache_capacity),

            import_max_bytes: parse_or(&lookup, "VERITY_IMPORT_MAX_BYTES", defaults.import_max_bytes),
            import_max_rows: parse_or(&lookup, "VERITY_IMPORT_MAX_ROWS", defaults.import_max_rows),
            default_issuing_unit_code: text_or(
                &lookup,
                "VERITY_DEFAULT_ISSUING_UNIT_CODE",
                &defaults.default_issuing_unit_code,
            ),

            identifier_org: text_or(&lookup, "VERITY_IDENTIFIER_ORG", &defaults.identifier_org),
            request_timeout: Duration::from_secs(parse_or(
                &lookup,
                "VERITY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            stats_top_n: parse_or(&lookup, "VERITY_STATS_TOP_N", defaults.stats_top_n),
            environment: text_or(&lookup, "VERITY_ENVIRONMENT", &defaults.environment),
        }
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    /// Check if a given origin is allowed.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // *.example.edu.vn
            if let Some(pattern) = allowed.strip_prefix("*.") {
                if let Some(origin_domain) = origin.strip_prefix("https://") {
                    return origin_domain.ends_with(&format!(".{pattern}"))
                        || origin_domain == pattern;
                }
            }
            false
        })
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.cache_ttl,
            capacity: self.cache_capacity,
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests: self.search_rate_limit,
            window: self.search_rate_window,
            fail_open_limit: self.search_fail_open_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert!(config.cors_origins.is_empty());
        assert_eq!(config.search_rate_limit, 30);
        assert_eq!(config.search_rate_window, Duration::from_secs(3600));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.cache_capacity, 1000);
        assert_eq!(config.import_max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.import_max_rows, 1000);
        assert_eq!(config.identifier_org, "VB");
        assert_eq!(config.default_issuing_unit_code, "DHQG");
    }

    #[test]
    fn test_empty_lookup_matches_defaults() {
        let config = ApiConfig::from_lookup(|_| None);
        let defaults = ApiConfig::default();
        assert_eq!(config.search_rate_limit, defaults.search_rate_limit);
        assert_eq!(config.request_timeout, defaults.request_timeout);
        assert_eq!(config.environment, "production");
    }

    #[test]
    fn test_lookup_overrides_and_ignores_garbage() {
        let config = ApiConfig::from_lookup(lookup_from(&[
            ("VERITY_SEARCH_RATE_LIMIT", "5"),
            ("VERITY_CACHE_CAPACITY", "not-a-number"),
            ("VERITY_FLOOD_LIMIT_ENABLED", "false"),
            ("VERITY_IDENTIFIER_ORG", "  QG "),
            ("VERITY_CORS_ORIGINS", "https://a.example, ,https://b.example"),
        ]));
        assert_eq!(config.search_rate_limit, 5);
        assert_eq!(config.cache_capacity, 1000);
        assert!(!config.flood_limit_enabled);
        assert_eq!(config.identifier_org, "QG");
        assert_eq!(config.cors_origins.len(), 2);
    }

    #[test]
    fn test_origin_allowed_production() {
        let config = ApiConfig {
            cors_origins: vec![
                "https://tracuu.example.edu.vn".to_string(),
                "*.admin.example.edu.vn".to_string(),
            ],
            ..ApiConfig::default()
        };
        assert!(config.is_production());
        assert!(config.is_origin_allowed("https://tracuu.example.edu.vn"));
        assert!(config.is_origin_allowed("https://x.admin.example.edu.vn"));
        assert!(!config.is_origin_allowed("https://evil.example"));
        assert!(!config.is_origin_allowed("https://notadmin.example.edu.vn"));
    }
}
