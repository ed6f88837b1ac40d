//! Verity Storage - Storage Trait and Mock Implementation
//!
//! Defines the storage abstraction shared by the services. The PostgreSQL
//! implementation lives in verity-api (`db::DbClient`); [`MockStorage`] keeps
//! everything in memory for tests and local runs.

pub mod cache;

pub use cache::{CacheConfig, CacheStats, TtlCache};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use uuid::Uuid;
use verity_core::{
    has_sequence_tail, AdminActionLogEntry, AdminUser, ComboQuery, DiplomaListFilter, DiplomaRecord, SearchLogEntry,
    SearchSummary, StorageError, Timestamp, TopSearched, VerityResult,
};

// ============================================================================
// STORAGE TRAIT
// ============================================================================

/// Persistence for diploma records, search logs, admin audit logs and
/// admin accounts.
///
/// "Active" means `is_active = true`; soft-deleted records stay in storage
/// and are still visible to [`RegistryStore::diploma_get`] and to duplicate
/// checks.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    // === Diplomas ===

    /// Insert a new record.
    ///
    /// Fails with [`StorageError::UniqueViolation`] when another active record
    /// has the same document number or any record has the same identifier.
    async fn diploma_insert(&self, record: &DiplomaRecord) -> VerityResult<()>;

    /// Get a record by id, active or not.
    async fn diploma_get(&self, id: Uuid) -> VerityResult<Option<DiplomaRecord>>;

    /// Overwrite a stored record's mutable columns.
    async fn diploma_update(&self, record: &DiplomaRecord) -> VerityResult<()>;

    /// Flip `is_active` to false.
    async fn diploma_soft_delete(
        &self,
        id: Uuid,
        updated_by: &str,
        at: Timestamp,
    ) -> VerityResult<()>;

    /// One page of active records, newest first, plus the filtered total.
    async fn diploma_list(
        &self,
        filter: &DiplomaListFilter,
    ) -> VerityResult<(Vec<DiplomaRecord>, u64)>;

    /// Whether any record, active or not, carries this document number.
    async fn diploma_document_number_exists(&self, document_number: &str) -> VerityResult<bool>;

    /// Active record with this document number.
    async fn diploma_find_by_number(
        &self,
        document_number: &str,
    ) -> VerityResult<Option<DiplomaRecord>>;

    /// First active record matching the combo.
    async fn diploma_find_by_combo(&self, query: &ComboQuery)
        -> VerityResult<Option<DiplomaRecord>>;

    /// Greatest identifier made of `prefix` and a six-digit sequence.
    async fn diploma_latest_identifier(&self, prefix: &str) -> VerityResult<Option<String>>;

    // === Search logs ===

    async fn search_log_append(&self, entry: &SearchLogEntry) -> VerityResult<()>;

    /// Rows for `client_address` with `created_at > since`.
    async fn search_log_count_since(
        &self,
        client_address: &str,
        since: Timestamp,
    ) -> VerityResult<u64>;

    async fn search_log_summary(&self, since: Timestamp) -> VerityResult<SearchSummary>;

    /// Most searched document numbers since `since`, highest count first.
    async fn search_log_top_numbers(
        &self,
        since: Timestamp,
        limit: usize,
    ) -> VerityResult<Vec<TopSearched>>;

    // === Admin audit logs ===

    async fn action_log_append(&self, entry: &AdminActionLogEntry) -> VerityResult<()>;

    /// Entries for one record, newest first.
    async fn action_log_for_record(&self, record_id: Uuid)
        -> VerityResult<Vec<AdminActionLogEntry>>;

    // === Admin accounts ===

    async fn admin_insert(&self, user: &AdminUser) -> VerityResult<()>;

    /// Active admin with this username.
    async fn admin_find_by_username(&self, username: &str) -> VerityResult<Option<AdminUser>>;

    async fn admin_record_login(&self, id: Uuid, at: Timestamp) -> VerityResult<()>;

    // === Health ===

    /// Cheap round-trip used by readiness checks.
    async fn ping(&self) -> VerityResult<()>;
}

// ============================================================================
// MOCK STORAGE
// ============================================================================

/// In-memory storage for tests and local runs.
///
/// Records keep insertion order, which is what "natural order" means for
/// combo lookups here. Failures can be injected per operation.
#[derive(Debug, Clone, Default)]
pub struct MockStorage {
    diplomas: Arc<RwLock<Vec<DiplomaRecord>>>,
    search_logs: Arc<RwLock<Vec<SearchLogEntry>>>,
    action_logs: Arc<RwLock<Vec<AdminActionLogEntry>>>,
    admins: Arc<RwLock<HashMap<Uuid, AdminUser>>>,
    fail_search_log_count: Arc<AtomicBool>,
    fail_search_log_append: Arc<AtomicBool>,
    fail_action_log_append: Arc<AtomicBool>,
    fail_ping: Arc<AtomicBool>,
    fail_insert_for: Arc<RwLock<HashSet<String>>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>, StorageError> {
    lock.read().map_err(|_| StorageError::LockPoisoned)
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>, StorageError> {
    lock.write().map_err(|_| StorageError::LockPoisoned)
}

fn injected(operation: &str) -> StorageError {
    StorageError::Unavailable {
        reason: format!("injected failure: {operation}"),
    }
}

impl MockStorage {
    /// Create a new mock storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `search_log_count_since` fail until switched off.
    pub fn fail_search_log_count(&self, fail: bool) {
        self.fail_search_log_count.store(fail, Ordering::SeqCst);
    }

    /// Make `search_log_append` fail until switched off.
    pub fn fail_search_log_append(&self, fail: bool) {
        self.fail_search_log_append.store(fail, Ordering::SeqCst);
    }

    /// Make `action_log_append` fail until switched off.
    pub fn fail_action_log_append(&self, fail: bool) {
        self.fail_action_log_append.store(fail, Ordering::SeqCst);
    }

    /// Make `ping` fail until switched off.
    pub fn fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    /// Make inserting a record with this document number fail.
    pub fn fail_insert_for(&self, document_number: impl Into<String>) -> VerityResult<()> {
        write(&self.fail_insert_for)?.insert(document_number.into());
        Ok(())
    }

    pub fn diploma_count(&self) -> VerityResult<usize> {
        Ok(read(&self.diplomas)?.len())
    }

    pub fn search_logs(&self) -> VerityResult<Vec<SearchLogEntry>> {
        Ok(read(&self.search_logs)?.clone())
    }

    pub fn action_logs(&self) -> VerityResult<Vec<AdminActionLogEntry>> {
        Ok(read(&self.action_logs)?.clone())
    }
}

#[async_trait]
impl RegistryStore for MockStorage {
    async fn diploma_insert(&self, record: &DiplomaRecord) -> VerityResult<()> {
        if read(&self.fail_insert_for)?.contains(&record.fields.document_number) {
            return Err(injected("diploma_insert").into());
        }

        let mut diplomas = write(&self.diplomas)?;
        if diplomas.iter().any(|d| d.id == record.id) {
            return Err(StorageError::UniqueViolation {
                constraint: "diplomas_pkey".to_string(),
            }
            .into());
        }
        if diplomas.iter().any(|d| d.identifier == record.identifier) {
            return Err(StorageError::UniqueViolation {
                constraint: "diplomas_identifier_key".to_string(),
            }
            .into());
        }
        if record.is_active
            && diplomas.iter().any(|d| {
                d.is_active && d.fields.document_number == record.fields.document_number
            })
        {
            return Err(StorageError::UniqueViolation {
                constraint: "diplomas_active_document_number_key".to_string(),
            }
            .into());
        }
        diplomas.push(record.clone());
        Ok(())
    }

    async fn diploma_get(&self, id: Uuid) -> VerityResult<Option<DiplomaRecord>> {
        Ok(read(&self.diplomas)?.iter().find(|d| d.id == id).cloned())
    }

    async fn diploma_update(&self, record: &DiplomaRecord) -> VerityResult<()> {
        let mut diplomas = write(&self.diplomas)?;
        if record.is_active
            && diplomas.iter().any(|d| {
                d.id != record.id
                    && d.is_active
                    && d.fields.document_number == record.fields.document_number
            })
        {
            return Err(StorageError::UniqueViolation {
                constraint: "diplomas_active_document_number_key".to_string(),
            }
            .into());
        }

        let stored = diplomas
            .iter_mut()
            .find(|d| d.id == record.id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "diploma".to_string(),
                id: record.id.to_string(),
            })?;

        // Identifier and creation columns are fixed at insert.
        stored.fields = record.fields.clone();
        stored.updated_by = record.updated_by.clone();
        stored.updated_at = record.updated_at;
        Ok(())
    }

    async fn diploma_soft_delete(
        &self,
        id: Uuid,
        updated_by: &str,
        at: Timestamp,
    ) -> VerityResult<()> {
        let mut diplomas = write(&self.diplomas)?;
        let stored = diplomas
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StorageError::NotFound {
                entity: "diploma".to_string(),
                id: id.to_string(),
            })?;
        stored.is_active = false;
        stored.updated_by = Some(updated_by.to_string());
        stored.updated_at = at;
        Ok(())
    }

    async fn diploma_list(
        &self,
        filter: &DiplomaListFilter,
    ) -> VerityResult<(Vec<DiplomaRecord>, u64)> {
        let diplomas = read(&self.diplomas)?;
        let mut matching: Vec<&DiplomaRecord> = diplomas
            .iter()
            .rev()
            .filter(|d| d.is_active && filter.matches(d))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matching.len() as u64;
        let offset = usize::try_from(filter.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(filter.limit as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn diploma_document_number_exists(&self, document_number: &str) -> VerityResult<bool> {
        Ok(read(&self.diplomas)?
            .iter()
            .any(|d| d.fields.document_number == document_number))
    }

    async fn diploma_find_by_number(
        &self,
        document_number: &str,
    ) -> VerityResult<Option<DiplomaRecord>> {
        Ok(read(&self.diplomas)?
            .iter()
            .find(|d| d.is_active && d.fields.document_number == document_number)
            .cloned())
    }

    async fn diploma_find_by_combo(
        &self,
        query: &ComboQuery,
    ) -> VerityResult<Option<DiplomaRecord>> {
        Ok(read(&self.diplomas)?
            .iter()
            .find(|d| d.is_active && query.matches(&d.fields))
            .cloned())
    }

    async fn diploma_latest_identifier(&self, prefix: &str) -> VerityResult<Option<String>> {
        Ok(read(&self.diplomas)?
            .iter()
            .filter(|d| has_sequence_tail(&d.identifier, prefix))
            .map(|d| d.identifier.clone())
            .max())
    }

    async fn search_log_append(&self, entry: &SearchLogEntry) -> VerityResult<()> {
        if self.fail_search_log_append.load(Ordering::SeqCst) {
            return Err(injected("search_log_append").into());
        }
        write(&self.search_logs)?.push(entry.clone());
        Ok(())
    }

    async fn search_log_count_since(
        &self,
        client_address: &str,
        since: Timestamp,
    ) -> VerityResult<u64> {
        if self.fail_search_log_count.load(Ordering::SeqCst) {
            return Err(injected("search_log_count_since").into());
        }
        Ok(read(&self.search_logs)?
            .iter()
            .filter(|e| e.client_address == client_address && e.created_at > since)
            .count() as u64)
    }

    async fn search_log_summary(&self, since: Timestamp) -> VerityResult<SearchSummary> {
        let logs = read(&self.search_logs)?;
        let window: Vec<&SearchLogEntry> = logs.iter().filter(|e| e.created_at > since).collect();

        let total = window.len() as u64;
        let found = window.iter().filter(|e| e.found).count() as u64;
        let unique_clients = window
            .iter()
            .map(|e| e.client_address.as_str())
            .collect::<HashSet<_>>()
            .len() as u64;
        let avg_latency_ms = if total == 0 {
            0.0
        } else {
            window.iter().map(|e| e.latency_ms as f64).sum::<f64>() / total as f64
        };

        Ok(SearchSummary {
            total,
            found,
            not_found: total - found,
            unique_clients,
            avg_latency_ms,
        })
    }

    async fn search_log_top_numbers(
        &self,
        since: Timestamp,
        limit: usize,
    ) -> VerityResult<Vec<TopSearched>> {
        let logs = read(&self.search_logs)?;
        let mut counts: HashMap<&str, u64> = HashMap::new();
        for entry in logs.iter().filter(|e| e.created_at > since) {
            if let Some(number) = entry.document_number.as_deref() {
                *counts.entry(number).or_default() += 1;
            }
        }

        let mut top: Vec<TopSearched> = counts
            .into_iter()
            .map(|(document_number, count)| TopSearched {
                document_number: document_number.to_string(),
                count,
            })
            .collect();
        top.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.document_number.cmp(&b.document_number))
        });
        top.truncate(limit);
        Ok(top)
    }

    async fn action_log_append(&self, entry: &AdminActionLogEntry) -> VerityResult<()> {
        if self.fail_action_log_append.load(Ordering::SeqCst) {
            return Err(injected("action_log_append").into());
        }
        write(&self.action_logs)?.push(entry.clone());
        Ok(())
    }

    async fn action_log_for_record(
        &self,
        record_id: Uuid,
    ) -> VerityResult<Vec<AdminActionLogEntry>> {
        let logs = read(&self.action_logs)?;
        let mut entries: Vec<AdminActionLogEntry> = logs
            .iter()
            .rev()
            .filter(|e| e.record_id == Some(record_id))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn admin_insert(&self, user: &AdminUser) -> VerityResult<()> {
        let mut admins = write(&self.admins)?;
        if admins.values().any(|a| a.username == user.username) {
            return Err(StorageError::UniqueViolation {
                constraint: "admin_users_username_key".to_string(),
            }
            .into());
        }
        admins.insert(user.id, user.clone());
        Ok(())
    }

    async fn admin_find_by_username(&self, username: &str) -> VerityResult<Option<AdminUser>> {
        Ok(read(&self.admins)?
            .values()
            .find(|a| a.is_active && a.username == username)
            .cloned())
    }

    async fn admin_record_login(&self, id: Uuid, at: Timestamp) -> VerityResult<()> {
        let mut admins = write(&self.admins)?;
        let admin = admins.get_mut(&id).ok_or_else(|| StorageError::NotFound {
            entity: "admin_user".to_string(),
            id: id.to_string(),
        })?;
        admin.last_login_at = Some(at);
        Ok(())
    }

    async fn ping(&self) -> VerityResult<()> {
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(injected("ping").into());
        }
        read(&self.diplomas)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};
    use verity_core::{DiplomaInput, IMPORT_REQUIRED};

    fn make_record(document_number: &str, identifier: &str) -> DiplomaRecord {
        let date = NaiveDate::from_ymd_opt(2023, 7, 15).unwrap();
        let fields = DiplomaInput {
            document_number: Some(document_number.to_string()),
            registry_number: Some("SV-1".to_string()),
            student_code: Some("20IT001".to_string()),
            national_id: Some("001200000001".to_string()),
            full_name: Some("Nguyễn Văn An".to_string()),
            birth_date: Some(NaiveDate::from_ymd_opt(2001, 6, 15).unwrap()),
            birth_place: Some("Hà Nội".to_string()),
            program: Some("Công nghệ thông tin".to_string()),
            program_code: Some("7480201".to_string()),
            specialization: Some("Phần mềm".to_string()),
            graduation_decision_number: Some("123/QĐ".to_string()),
            graduation_decision_date: Some(date),
            issue_date: Some(date),
            signer_name: Some("Trần Thị Bình".to_string()),
            signer_national_id: Some("001080000002".to_string()),
            ..Default::default()
        }
        .validate(IMPORT_REQUIRED)
        .unwrap();

        DiplomaRecord {
            id: Uuid::now_v7(),
            identifier: identifier.to_string(),
            fields,
            is_active: true,
            created_by: "admin".to_string(),
            updated_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_active_number() {
        let storage = MockStorage::new();
        storage
            .diploma_insert(&make_record("QH-1", "VB-2023-CNH-000001"))
            .await
            .unwrap();
        let err = storage
            .diploma_insert(&make_record("QH-1", "VB-2023-CNH-000002"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            verity_core::VerityError::Storage(StorageError::UniqueViolation { .. })
        ));
    }

    #[tokio::test]
    async fn test_soft_deleted_record_frees_number_but_still_exists() {
        let storage = MockStorage::new();
        let record = make_record("QH-1", "VB-2023-CNH-000001");
        storage.diploma_insert(&record).await.unwrap();
        storage
            .diploma_soft_delete(record.id, "admin", Utc::now())
            .await
            .unwrap();

        assert!(storage.diploma_find_by_number("QH-1").await.unwrap().is_none());
        assert!(storage.diploma_document_number_exists("QH-1").await.unwrap());
        let stored = storage.diploma_get(record.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
    }

    #[tokio::test]
    async fn test_list_is_active_only_newest_first_with_or_search() {
        let storage = MockStorage::new();
        let mut older = make_record("QH-1", "VB-2023-CNH-000001");
        older.created_at = Utc::now() - Duration::days(1);
        let newer = make_record("QH-2", "VB-2023-CNH-000002");
        let mut deleted = make_record("QH-3", "VB-2023-CNH-000003");
        deleted.is_active = false;
        for r in [&older, &newer, &deleted] {
            storage.diploma_insert(r).await.unwrap();
        }

        let (items, total) = storage
            .diploma_list(&DiplomaListFilter::default())
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].id, newer.id);
        assert_eq!(items[1].id, older.id);

        let filter = DiplomaListFilter::new(None, None, Some("cnh-000001".to_string()));
        let (items, total) = storage.diploma_list(&filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(items[0].id, older.id);
    }

    #[tokio::test]
    async fn test_latest_identifier_ignores_non_sequence_tails() {
        let storage = MockStorage::new();
        storage
            .diploma_insert(&make_record("QH-1", "VB-2023-CNH-000009"))
            .await
            .unwrap();
        storage
            .diploma_insert(&make_record("QH-2", "VB-2023-CNH-000010"))
            .await
            .unwrap();
        storage
            .diploma_insert(&make_record("QH-3", "VB-2023-THS-000050"))
            .await
            .unwrap();
        assert_eq!(
            storage
                .diploma_latest_identifier("VB-2023-CNH-")
                .await
                .unwrap()
                .as_deref(),
            Some("VB-2023-CNH-000010")
        );

        // Tails that are not six digits never win the ordering.
        storage
            .diploma_insert(&make_record("QH-4", "VB-2023-CNH-legacy"))
            .await
            .unwrap();
        storage
            .diploma_insert(&make_record("QH-5", "VB-2023-CNH-1000000"))
            .await
            .unwrap();
        assert_eq!(
            storage
                .diploma_latest_identifier("VB-2023-CNH-")
                .await
                .unwrap()
                .as_deref(),
            Some("VB-2023-CNH-000010")
        );
        assert!(storage
            .diploma_latest_identifier("VB-2024-CNH-")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_search_log_window_and_summary() {
        let storage = MockStorage::new();
        let now = Utc::now();
        let old = SearchLogEntry::new("1.1.1.1", now - Duration::hours(2))
            .with_document_number(Some("QH-1"));
        let mut recent = SearchLogEntry::new("1.1.1.1", now).with_document_number(Some("QH-1"));
        recent.found = true;
        recent.latency_ms = 10;
        let other = SearchLogEntry::new("2.2.2.2", now).with_document_number(Some("QH-2"));
        for e in [&old, &recent, &other] {
            storage.search_log_append(e).await.unwrap();
        }

        let since = now - Duration::hours(1);
        assert_eq!(storage.search_log_count_since("1.1.1.1", since).await.unwrap(), 1);

        let summary = storage.search_log_summary(since).await.unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.found, 1);
        assert_eq!(summary.not_found, 1);
        assert_eq!(summary.unique_clients, 2);
        assert_eq!(summary.avg_latency_ms, 5.0);

        let top = storage
            .search_log_top_numbers(now - Duration::days(7), 10)
            .await
            .unwrap();
        assert_eq!(top[0].document_number, "QH-1");
        assert_eq!(top[0].count, 2);
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let storage = MockStorage::new();
        storage.fail_search_log_count(true);
        assert!(storage
            .search_log_count_since("1.1.1.1", Utc::now())
            .await
            .is_err());

        storage.fail_insert_for("QH-9").unwrap();
        assert!(storage
            .diploma_insert(&make_record("QH-9", "VB-2023-CNH-000001"))
            .await
            .is_err());
        assert_eq!(storage.diploma_count().unwrap(), 0);
    }
}
