//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and [`DbClient`],
//! the [`RegistryStore`] implementation over parameterized SQL.
//!
//! Every operation takes one pooled connection and returns it on drop.

use async_trait::async_trait;
use deadpool_postgres::{
    Config, ManagerConfig, Pool, PoolConfig, PoolError, RecyclingMethod, Runtime, Timeouts,
};
use once_cell::sync::Lazy;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;
use verity_core::{
    AdminAction, AdminActionLogEntry, AdminUser, ComboQuery, DiplomaFields, DiplomaListFilter,
    DiplomaRecord, SearchLogEntry, SearchSummary, StorageError, Timestamp, TopSearched,
    VerityResult,
};
use verity_storage::RegistryStore;

use crate::error::{ApiError, ApiResult};

/// Initial schema, applied when `VERITY_DB_RUN_MIGRATIONS=true`.
pub const INIT_MIGRATION: &str = include_str!("../migrations/0001_init.sql");

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: SecretString,
    /// Connections opened at startup and kept warm
    pub min_size: usize,
    /// Maximum pool size
    pub max_size: usize,
    /// Wait/create timeout for a connection
    pub connect_timeout: Duration,
    /// Connections unused for this long are closed by the reaper
    pub idle_timeout: Duration,
    /// Apply the bundled schema at startup
    pub run_migrations: bool,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "verity".to_string(),
            user: "postgres".to_string(),
            password: SecretString::from(String::new()),
            min_size: 2,
            max_size: 16,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(30),
            run_migrations: false,
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("VERITY_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("VERITY_DB_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: std::env::var("VERITY_DB_NAME").unwrap_or(defaults.dbname),
            user: std::env::var("VERITY_DB_USER").unwrap_or(defaults.user),
            password: std::env::var("VERITY_DB_PASSWORD")
                .map(SecretString::from)
                .unwrap_or(defaults.password),
            min_size: std::env::var("VERITY_DB_POOL_MIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_size),
            max_size: std::env::var("VERITY_DB_POOL_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            connect_timeout: Duration::from_secs(
                std::env::var("VERITY_DB_CONNECT_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.connect_timeout.as_secs()),
            ),
            idle_timeout: Duration::from_secs(
                std::env::var("VERITY_DB_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(defaults.idle_timeout.as_secs()),
            ),
            run_migrations: std::env::var("VERITY_DB_RUN_MIGRATIONS")
                .map(|s| s.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.expose_secret().to_string());
        cfg.connect_timeout = Some(self.connect_timeout);

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = PoolConfig::new(self.max_size.max(1));
        pool_cfg.timeouts = Timeouts {
            wait: Some(self.connect_timeout),
            create: Some(self.connect_timeout),
            recycle: Some(self.connect_timeout),
        };
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::internal_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

fn map_pg_error(err: tokio_postgres::Error) -> StorageError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        let constraint = err
            .as_db_error()
            .and_then(|db| db.constraint())
            .unwrap_or("unknown")
            .to_string();
        return StorageError::UniqueViolation { constraint };
    }
    tracing::error!(error = ?err, "Database error");
    StorageError::QueryFailed {
        reason: err.to_string(),
    }
}

fn map_pool_error(err: PoolError) -> StorageError {
    tracing::error!(error = ?err, "Connection pool error");
    match err {
        PoolError::Timeout(_) => StorageError::PoolTimeout,
        other => StorageError::Unavailable {
            reason: other.to_string(),
        },
    }
}

fn col<'a, T: FromSql<'a>>(row: &'a Row, table: &str, name: &str) -> Result<T, StorageError> {
    row.try_get(name).map_err(|e| StorageError::CorruptRow {
        table: table.to_string(),
        reason: format!("{name}: {e}"),
    })
}

/// Escape LIKE wildcards so user text matches literally.
fn like_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

// ============================================================================
// DIPLOMA SQL
// ============================================================================

/// Editable columns, in the order [`field_params`] binds them.
const FIELD_COLUMNS: [&str; 33] = [
    "document_number",
    "registry_number",
    "student_code",
    "national_id",
    "full_name",
    "birth_date",
    "birth_place",
    "sex",
    "ethnicity",
    "nationality",
    "diploma_type",
    "program",
    "program_code",
    "specialization",
    "classification",
    "graduation_year",
    "total_credits",
    "training_format",
    "training_language",
    "training_duration",
    "graduation_decision_number",
    "graduation_decision_date",
    "issue_decision_number",
    "issue_decision_date",
    "issuing_unit",
    "issuing_unit_code",
    "signer_name",
    "signer_national_id",
    "signer_title",
    "issue_place",
    "issue_date",
    "attachment_name",
    "attachment_content",
];

static DIPLOMA_COLUMNS: Lazy<String> = Lazy::new(|| {
    let mut columns = vec!["id", "identifier"];
    columns.extend(FIELD_COLUMNS);
    columns.extend([
        "is_active",
        "created_by",
        "updated_by",
        "created_at",
        "updated_at",
    ]);
    columns.join(", ")
});

static INSERT_DIPLOMA_SQL: Lazy<String> = Lazy::new(|| {
    let count = FIELD_COLUMNS.len() + 7;
    let placeholders: Vec<String> = (1..=count).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO diplomas ({}) VALUES ({})",
        *DIPLOMA_COLUMNS,
        placeholders.join(", ")
    )
});

static UPDATE_DIPLOMA_SQL: Lazy<String> = Lazy::new(|| {
    let mut sets: Vec<String> = FIELD_COLUMNS
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{name} = ${}", i + 2))
        .collect();
    let next = FIELD_COLUMNS.len() + 2;
    sets.push(format!("updated_by = ${next}"));
    sets.push(format!("updated_at = ${}", next + 1));
    format!("UPDATE diplomas SET {} WHERE id = $1", sets.join(", "))
});

fn field_params(f: &DiplomaFields) -> [&(dyn ToSql + Sync); 33] {
    [
        &f.document_number,
        &f.registry_number,
        &f.student_code,
        &f.national_id,
        &f.full_name,
        &f.birth_date,
        &f.birth_place,
        &f.sex,
        &f.ethnicity,
        &f.nationality,
        &f.diploma_type,
        &f.program,
        &f.program_code,
        &f.specialization,
        &f.classification,
        &f.graduation_year,
        &f.total_credits,
        &f.training_format,
        &f.training_language,
        &f.training_duration,
        &f.graduation_decision_number,
        &f.graduation_decision_date,
        &f.issue_decision_number,
        &f.issue_decision_date,
        &f.issuing_unit,
        &f.issuing_unit_code,
        &f.signer_name,
        &f.signer_national_id,
        &f.signer_title,
        &f.issue_place,
        &f.issue_date,
        &f.attachment_name,
        &f.attachment_content,
    ]
}

fn row_to_diploma(row: &Row) -> Result<DiplomaRecord, StorageError> {
    const T: &str = "diplomas";
    Ok(DiplomaRecord {
        id: col(row, T, "id")?,
        identifier: col(row, T, "identifier")?,
        fields: DiplomaFields {
            document_number: col(row, T, "document_number")?,
            registry_number: col(row, T, "registry_number")?,
            student_code: col(row, T, "student_code")?,
            national_id: col(row, T, "national_id")?,
            full_name: col(row, T, "full_name")?,
            birth_date: col(row, T, "birth_date")?,
            birth_place: col(row, T, "birth_place")?,
            sex: col(row, T, "sex")?,
            ethnicity: col(row, T, "ethnicity")?,
            nationality: col(row, T, "nationality")?,
            diploma_type: col(row, T, "diploma_type")?,
            program: col(row, T, "program")?,
            program_code: col(row, T, "program_code")?,
            specialization: col(row, T, "specialization")?,
            classification: col(row, T, "classification")?,
            graduation_year: col(row, T, "graduation_year")?,
            total_credits: col(row, T, "total_credits")?,
            training_format: col(row, T, "training_format")?,
            training_language: col(row, T, "training_language")?,
            training_duration: col(row, T, "training_duration")?,
            graduation_decision_number: col(row, T, "graduation_decision_number")?,
            graduation_decision_date: col(row, T, "graduation_decision_date")?,
            issue_decision_number: col(row, T, "issue_decision_number")?,
            issue_decision_date: col(row, T, "issue_decision_date")?,
            issuing_unit: col(row, T, "issuing_unit")?,
            issuing_unit_code: col(row, T, "issuing_unit_code")?,
            signer_name: col(row, T, "signer_name")?,
            signer_national_id: col(row, T, "signer_national_id")?,
            signer_title: col(row, T, "signer_title")?,
            issue_place: col(row, T, "issue_place")?,
            issue_date: col(row, T, "issue_date")?,
            attachment_name: col(row, T, "attachment_name")?,
            attachment_content: col(row, T, "attachment_content")?,
        },
        is_active: col(row, T, "is_active")?,
        created_by: col(row, T, "created_by")?,
        updated_by: col(row, T, "updated_by")?,
        created_at: col(row, T, "created_at")?,
        updated_at: col(row, T, "updated_at")?,
    })
}

fn row_to_action_log(row: &Row) -> Result<AdminActionLogEntry, StorageError> {
    const T: &str = "admin_action_logs";
    let action: String = col(row, T, "action")?;
    Ok(AdminActionLogEntry {
        id: col(row, T, "id")?,
        admin_username: col(row, T, "admin_username")?,
        action: AdminAction::parse(&action).ok_or_else(|| StorageError::CorruptRow {
            table: T.to_string(),
            reason: format!("unknown action '{action}'"),
        })?,
        table_name: col(row, T, "table_name")?,
        record_id: col(row, T, "record_id")?,
        before: col(row, T, "before_data")?,
        after: col(row, T, "after_data")?,
        description: col(row, T, "description")?,
        client_address: col(row, T, "client_address")?,
        created_at: col(row, T, "created_at")?,
    })
}

fn row_to_admin(row: &Row) -> Result<AdminUser, StorageError> {
    const T: &str = "admin_users";
    Ok(AdminUser {
        id: col(row, T, "id")?,
        username: col(row, T, "username")?,
        password_hash: col(row, T, "password_hash")?,
        display_name: col(row, T, "display_name")?,
        is_active: col(row, T, "is_active")?,
        last_login_at: col(row, T, "last_login_at")?,
        created_at: col(row, T, "created_at")?,
    })
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// ============================================================================
// DATABASE CLIENT
// ============================================================================

/// Pool gauges exposed by the stats surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PoolGauges {
    pub max_size: u64,
    pub size: u64,
    pub available: u64,
    pub waiting: u64,
}

/// PostgreSQL-backed registry storage.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("pool", &self.pool_gauges())
            .finish()
    }
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    pub fn pool_gauges(&self) -> PoolGauges {
        let status = self.pool.status();
        PoolGauges {
            max_size: status.max_size as u64,
            size: status.size as u64,
            available: status.available as u64,
            waiting: status.waiting as u64,
        }
    }

    /// Get a connection from the pool.
    async fn get_conn(&self) -> Result<deadpool_postgres::Object, StorageError> {
        self.pool.get().await.map_err(map_pool_error)
    }

    /// Open connections until `min_size` are pooled.
    pub async fn warm_up(&self, min_size: usize) -> VerityResult<()> {
        let missing = min_size.saturating_sub(self.pool.status().size);
        let mut held = Vec::with_capacity(missing);
        for _ in 0..missing {
            held.push(self.get_conn().await?);
        }
        tracing::debug!(opened = held.len(), "Connection pool warmed");
        Ok(())
    }

    /// Close connections idle longer than `idle_timeout`, then top the pool
    /// back up to `min_size`, on every `interval` tick.
    pub fn spawn_idle_reaper(
        &self,
        idle_timeout: Duration,
        min_size: usize,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let result = client
                    .pool
                    .retain(|_, metrics| metrics.last_used() < idle_timeout);
                if !result.removed.is_empty() {
                    tracing::debug!(closed = result.removed.len(), "Closed idle connections");
                }
                if let Err(e) = client.warm_up(min_size).await {
                    tracing::warn!(error = %e, "Connection pool warm-up failed");
                }
            }
        })
    }

    /// Apply the bundled schema.
    pub async fn run_migrations(&self) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(INIT_MIGRATION)
            .await
            .map_err(map_pg_error)?;
        tracing::info!("Database migrations applied");
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for DbClient {
    async fn diploma_insert(&self, record: &DiplomaRecord) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        let fields = field_params(&record.fields);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(fields.len() + 7);
        params.push(&record.id);
        params.push(&record.identifier);
        params.extend(fields);
        params.push(&record.is_active);
        params.push(&record.created_by);
        params.push(&record.updated_by);
        params.push(&record.created_at);
        params.push(&record.updated_at);

        conn.execute(INSERT_DIPLOMA_SQL.as_str(), &params)
            .await
            .map_err(map_pg_error)?;
        Ok(())
    }

    async fn diploma_get(&self, id: Uuid) -> VerityResult<Option<DiplomaRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!("SELECT {} FROM diplomas WHERE id = $1", *DIPLOMA_COLUMNS);
        let row = conn.query_opt(sql.as_str(), &[&id]).await.map_err(map_pg_error)?;
        Ok(row.as_ref().map(row_to_diploma).transpose()?)
    }

    async fn diploma_update(&self, record: &DiplomaRecord) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        let fields = field_params(&record.fields);
        let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(fields.len() + 3);
        params.push(&record.id);
        params.extend(fields);
        params.push(&record.updated_by);
        params.push(&record.updated_at);

        let updated = conn
            .execute(UPDATE_DIPLOMA_SQL.as_str(), &params)
            .await
            .map_err(map_pg_error)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                entity: "diploma".to_string(),
                id: record.id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn diploma_soft_delete(
        &self,
        id: Uuid,
        updated_by: &str,
        at: Timestamp,
    ) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE diplomas SET is_active = FALSE, updated_by = $2, updated_at = $3 \
                 WHERE id = $1",
                &[&id, &updated_by, &at],
            )
            .await
            .map_err(map_pg_error)?;
        if updated == 0 {
            return Err(StorageError::NotFound {
                entity: "diploma".to_string(),
                id: id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn diploma_list(
        &self,
        filter: &DiplomaListFilter,
    ) -> VerityResult<(Vec<DiplomaRecord>, u64)> {
        let conn = self.get_conn().await?;
        let pattern: Option<String> = filter
            .search
            .as_deref()
            .map(|s| format!("%{}%", like_escape(s)));
        let predicate = "is_active AND ($1::text IS NULL \
             OR document_number ILIKE $1 OR full_name ILIKE $1 OR student_code ILIKE $1 \
             OR program ILIKE $1 OR identifier ILIKE $1)";

        let count_sql = format!("SELECT COUNT(*) FROM diplomas WHERE {predicate}");
        let total: i64 = conn
            .query_one(count_sql.as_str(), &[&pattern])
            .await
            .map_err(map_pg_error)?
            .try_get(0)
            .map_err(map_pg_error)?;

        let limit = i64::from(filter.limit);
        let offset = i64::try_from(filter.offset()).unwrap_or(i64::MAX);
        let page_sql = format!(
            "SELECT {} FROM diplomas WHERE {predicate} \
             ORDER BY created_at DESC LIMIT $2 OFFSET $3",
            *DIPLOMA_COLUMNS
        );
        let rows = conn
            .query(page_sql.as_str(), &[&pattern, &limit, &offset])
            .await
            .map_err(map_pg_error)?;

        let items = rows
            .iter()
            .map(row_to_diploma)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, count(total)))
    }

    async fn diploma_document_number_exists(&self, document_number: &str) -> VerityResult<bool> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM diplomas WHERE document_number = $1)",
                &[&document_number],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(row.try_get(0).map_err(map_pg_error)?)
    }

    async fn diploma_find_by_number(
        &self,
        document_number: &str,
    ) -> VerityResult<Option<DiplomaRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM diplomas WHERE is_active AND document_number = $1 LIMIT 1",
            *DIPLOMA_COLUMNS
        );
        let row = conn
            .query_opt(sql.as_str(), &[&document_number])
            .await
            .map_err(map_pg_error)?;
        Ok(row.as_ref().map(row_to_diploma).transpose()?)
    }

    async fn diploma_find_by_combo(
        &self,
        query: &ComboQuery,
    ) -> VerityResult<Option<DiplomaRecord>> {
        let conn = self.get_conn().await?;
        let sql = format!(
            "SELECT {} FROM diplomas WHERE is_active AND student_code = $1 \
             AND ($2::text IS NULL OR lower(full_name) = lower($2)) \
             AND ($3::date IS NULL OR birth_date = $3) LIMIT 1",
            *DIPLOMA_COLUMNS
        );
        let rows = conn
            .query(
                sql.as_str(),
                &[&query.student_code, &query.full_name, &query.birth_date],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(rows.first().map(row_to_diploma).transpose()?)
    }

    async fn diploma_latest_identifier(&self, prefix: &str) -> VerityResult<Option<String>> {
        let conn = self.get_conn().await?;
        let pattern = format!("{}%", like_escape(prefix));
        let tail_offset = i32::try_from(prefix.chars().count() + 1).unwrap_or(i32::MAX);
        let row = conn
            .query_opt(
                "SELECT identifier FROM diplomas WHERE identifier LIKE $1 \
                 AND substr(identifier, $2) ~ '^[0-9]{6}$' \
                 ORDER BY identifier DESC LIMIT 1",
                &[&pattern, &tail_offset],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(row
            .as_ref()
            .map(|r| col::<String>(r, "diplomas", "identifier"))
            .transpose()?)
    }

    async fn search_log_append(&self, entry: &SearchLogEntry) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO search_logs (id, document_number, document_hash, client_address, \
             user_agent, found, latency_ms, verification_score, verification_status, error, \
             created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            &[
                &entry.id,
                &entry.document_number,
                &entry.document_hash,
                &entry.client_address,
                &entry.user_agent,
                &entry.found,
                &entry.latency_ms,
                &entry.verification_score,
                &entry.verification_status,
                &entry.error,
                &entry.created_at,
            ],
        )
        .await
        .map_err(map_pg_error)?;
        Ok(())
    }

    async fn search_log_count_since(
        &self,
        client_address: &str,
        since: Timestamp,
    ) -> VerityResult<u64> {
        let conn = self.get_conn().await?;
        let total: i64 = conn
            .query_one(
                "SELECT COUNT(*) FROM search_logs WHERE client_address = $1 AND created_at > $2",
                &[&client_address, &since],
            )
            .await
            .map_err(map_pg_error)?
            .try_get(0)
            .map_err(map_pg_error)?;
        Ok(count(total))
    }

    async fn search_log_summary(&self, since: Timestamp) -> VerityResult<SearchSummary> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one(
                "SELECT COUNT(*) AS total, \
                 COUNT(*) FILTER (WHERE found) AS found, \
                 COUNT(DISTINCT client_address) AS unique_clients, \
                 COALESCE(AVG(latency_ms), 0)::float8 AS avg_latency_ms \
                 FROM search_logs WHERE created_at > $1",
                &[&since],
            )
            .await
            .map_err(map_pg_error)?;

        let total = count(col(&row, "search_logs", "total")?);
        let found = count(col(&row, "search_logs", "found")?);
        Ok(SearchSummary {
            total,
            found,
            not_found: total.saturating_sub(found),
            unique_clients: count(col(&row, "search_logs", "unique_clients")?),
            avg_latency_ms: col(&row, "search_logs", "avg_latency_ms")?,
        })
    }

    async fn search_log_top_numbers(
        &self,
        since: Timestamp,
        limit: usize,
    ) -> VerityResult<Vec<TopSearched>> {
        let conn = self.get_conn().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = conn
            .query(
                "SELECT document_number, COUNT(*) AS searches FROM search_logs \
                 WHERE created_at > $1 AND document_number IS NOT NULL \
                 GROUP BY document_number ORDER BY searches DESC, document_number LIMIT $2",
                &[&since, &limit],
            )
            .await
            .map_err(map_pg_error)?;

        rows.iter()
            .map(|row| {
                Ok(TopSearched {
                    document_number: col(row, "search_logs", "document_number")?,
                    count: count(col(row, "search_logs", "searches")?),
                })
            })
            .collect()
    }

    async fn action_log_append(&self, entry: &AdminActionLogEntry) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO admin_action_logs (id, admin_username, action, table_name, record_id, \
             before_data, after_data, description, client_address, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            &[
                &entry.id,
                &entry.admin_username,
                &entry.action.as_str(),
                &entry.table_name,
                &entry.record_id,
                &entry.before,
                &entry.after,
                &entry.description,
                &entry.client_address,
                &entry.created_at,
            ],
        )
        .await
        .map_err(map_pg_error)?;
        Ok(())
    }

    async fn action_log_for_record(
        &self,
        record_id: Uuid,
    ) -> VerityResult<Vec<AdminActionLogEntry>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT id, admin_username, action, table_name, record_id, before_data, \
                 after_data, description, client_address, created_at \
                 FROM admin_action_logs WHERE record_id = $1 ORDER BY created_at DESC",
                &[&record_id],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(rows
            .iter()
            .map(row_to_action_log)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn admin_insert(&self, user: &AdminUser) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO admin_users (id, username, password_hash, display_name, is_active, \
             last_login_at, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            &[
                &user.id,
                &user.username,
                &user.password_hash,
                &user.display_name,
                &user.is_active,
                &user.last_login_at,
                &user.created_at,
            ],
        )
        .await
        .map_err(map_pg_error)?;
        Ok(())
    }

    async fn admin_find_by_username(&self, username: &str) -> VerityResult<Option<AdminUser>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, username, password_hash, display_name, is_active, last_login_at, \
                 created_at FROM admin_users WHERE username = $1 AND is_active",
                &[&username],
            )
            .await
            .map_err(map_pg_error)?;
        Ok(row.as_ref().map(row_to_admin).transpose()?)
    }

    async fn admin_record_login(&self, id: Uuid, at: Timestamp) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "UPDATE admin_users SET last_login_at = $2 WHERE id = $1",
            &[&id, &at],
        )
        .await
        .map_err(map_pg_error)?;
        Ok(())
    }

    async fn ping(&self) -> VerityResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1").await.map_err(map_pg_error)?;
        Ok(())
    }
}
