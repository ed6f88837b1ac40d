//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use verity_core::{Clock, PublicDiploma, SystemClock};
use verity_storage::{RegistryStore, TtlCache};

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::db::DbClient;
use crate::services::{
    DiplomaService, HumanVerifier, IdentifierGenerator, ImportLimits, ImportService,
    RateLimiter, SearchService, StatsService,
};

/// Search result cache shared by the search and admin services.
pub type SearchCache = TtlCache<PublicDiploma>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Registry persistence (PostgreSQL in production, `MockStorage` in tests).
    pub storage: Arc<dyn RegistryStore>,
    /// Raw database client, kept for pool gauges. `None` without PostgreSQL.
    pub db: Option<DbClient>,
    pub config: Arc<ApiConfig>,
    pub auth: Arc<AuthConfig>,
    pub verifier: Arc<dyn HumanVerifier>,
    pub cache: Arc<SearchCache>,
    pub clock: Arc<dyn Clock>,
    pub search: SearchService,
    pub diplomas: DiplomaService,
    pub imports: ImportService,
    pub stats: StatsService,
    pub start_time: Instant,
}

impl AppState {
    /// Wire every service over one storage backend and one cache.
    pub fn new(
        storage: Arc<dyn RegistryStore>,
        db: Option<DbClient>,
        config: ApiConfig,
        auth: AuthConfig,
        verifier: Arc<dyn HumanVerifier>,
    ) -> Self {
        Self::with_clock(storage, db, config, auth, verifier, Arc::new(SystemClock))
    }

    /// Same as [`AppState::new`] with an explicit clock for the services.
    pub fn with_clock(
        storage: Arc<dyn RegistryStore>,
        db: Option<DbClient>,
        config: ApiConfig,
        auth: AuthConfig,
        verifier: Arc<dyn HumanVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let start_time = Instant::now();
        let cache = Arc::new(TtlCache::with_clock(config.cache_config(), clock.clone()));

        let limiter = RateLimiter::new(storage.clone(), clock.clone(), config.rate_limit_config());
        let search = SearchService::new(storage.clone(), cache.clone(), limiter, clock.clone());

        let identifiers = IdentifierGenerator::new(storage.clone(), config.identifier_org.clone());
        let diplomas =
            DiplomaService::new(storage.clone(), identifiers, cache.clone(), clock.clone());

        let imports = ImportService::new(
            diplomas.clone(),
            ImportLimits {
                max_bytes: config.import_max_bytes,
                max_rows: config.import_max_rows,
                default_issuing_unit_code: config.default_issuing_unit_code.clone(),
            },
        );

        let stats = StatsService::new(
            storage.clone(),
            cache.clone(),
            db.clone(),
            clock.clone(),
            config.stats_top_n,
            config.environment.clone(),
        )
        .with_start_time(start_time);

        Self {
            storage,
            db,
            config: Arc::new(config),
            auth: Arc::new(auth),
            verifier,
            cache,
            clock,
            search,
            diplomas,
            imports,
            stats,
            start_time,
        }
    }
}

crate::impl_from_ref!(Arc<dyn RegistryStore>, storage);
crate::impl_from_ref!(Arc<ApiConfig>, config);
crate::impl_from_ref!(Arc<AuthConfig>, auth);
crate::impl_from_ref!(Arc<dyn HumanVerifier>, verifier);
crate::impl_from_ref!(Arc<SearchCache>, cache);
crate::impl_from_ref!(SearchService, search);
crate::impl_from_ref!(DiplomaService, diplomas);
crate::impl_from_ref!(ImportService, imports);
crate::impl_from_ref!(StatsService, stats);
crate::impl_from_ref!(Instant, start_time);
