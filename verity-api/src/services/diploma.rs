//! Diploma Service
//!
//! Administrative create, update, soft delete, listing and audit history.
//! Every mutation writes one admin action log entry with before/after
//! snapshots.

use std::sync::Arc;

use base64::Engine;
use uuid::Uuid;
use verity_core::{
    AdminAction, AdminActionLogEntry, Clock, DiplomaFields, DiplomaInput, DiplomaListFilter,
    DiplomaPage, DiplomaRecord, PublicDiploma, StorageError, ValidationError,
    VerityError, VerityResult, CREATE_REQUIRED,
};
use verity_storage::{RegistryStore, TtlCache};

use crate::error::{ApiError, ApiResult};
use crate::services::identifier::IdentifierGenerator;

/// Table name recorded in audit entries.
pub const DIPLOMA_TABLE: &str = "diplomas";

const ACTIVE_NUMBER_CONSTRAINT: &str = "diplomas_active_document_number_key";

/// Who performed a mutation and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditContext {
    pub admin_username: String,
    pub client_address: String,
}

impl AuditContext {
    pub fn new(admin_username: impl Into<String>, client_address: impl Into<String>) -> Self {
        Self {
            admin_username: admin_username.into(),
            client_address: client_address.into(),
        }
    }
}

#[derive(Clone)]
pub struct DiplomaService {
    storage: Arc<dyn RegistryStore>,
    identifiers: IdentifierGenerator,
    cache: Arc<TtlCache<PublicDiploma>>,
    clock: Arc<dyn Clock>,
}

impl DiplomaService {
    pub fn new(
        storage: Arc<dyn RegistryStore>,
        identifiers: IdentifierGenerator,
        cache: Arc<TtlCache<PublicDiploma>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            identifiers,
            cache,
            clock,
        }
    }

    /// Create a record from the admin form.
    ///
    /// The first missing required field is reported by name.
    pub async fn create(
        &self,
        input: DiplomaInput,
        actor: &AuditContext,
    ) -> ApiResult<DiplomaRecord> {
        let submitted = input.normalized();
        let fields = validate_form(submitted.clone())?;

        let record = self
            .persist_new(fields, &actor.admin_username)
            .await
            .map_err(ApiError::from)?;

        let mut after = serde_json::to_value(&submitted).ok();
        if let Some(serde_json::Value::Object(map)) = after.as_mut() {
            map.insert(
                "identifier".to_string(),
                serde_json::Value::String(record.identifier.clone()),
            );
        }
        self.audit(
            actor,
            AdminAction::Create,
            Some(record.id),
            None,
            after,
            format!(
                "Created diploma {} ({})",
                record.fields.document_number, record.identifier
            ),
        )
        .await;

        tracing::info!(
            admin = %actor.admin_username,
            identifier = %record.identifier,
            "Diploma created"
        );
        Ok(record)
    }

    /// Overwrite every mutable field of a record, active or not.
    ///
    /// The document number may change; a collision with another active
    /// record is reported as a duplicate.
    pub async fn update(
        &self,
        id: Uuid,
        input: DiplomaInput,
        actor: &AuditContext,
    ) -> ApiResult<DiplomaRecord> {
        let before = self
            .storage
            .diploma_get(id)
            .await?
            .ok_or_else(ApiError::diploma_not_found)?;

        let submitted = input.normalized();
        let fields = validate_form(submitted.clone())?;

        let mut updated = before.clone();
        updated.fields = fields;
        updated.updated_by = Some(actor.admin_username.clone());
        updated.updated_at = self.clock.now();

        self.storage
            .diploma_update(&updated)
            .await
            .map_err(|e| duplicate_on_active_number(e, &updated.fields.document_number))?;

        self.invalidate(&before);
        self.invalidate(&updated);

        self.audit(
            actor,
            AdminAction::Update,
            Some(id),
            serde_json::to_value(&before).ok(),
            serde_json::to_value(&submitted).ok(),
            format!("Updated diploma {}", updated.fields.document_number),
        )
        .await;

        tracing::info!(admin = %actor.admin_username, %id, "Diploma updated");
        Ok(updated)
    }

    /// Soft delete: the row stays, `is_active` flips to false.
    pub async fn delete(&self, id: Uuid, actor: &AuditContext) -> ApiResult<DiplomaRecord> {
        let before = self
            .storage
            .diploma_get(id)
            .await?
            .ok_or_else(ApiError::diploma_not_found)?;

        let now = self.clock.now();
        self.storage
            .diploma_soft_delete(id, &actor.admin_username, now)
            .await?;
        self.invalidate(&before);

        self.audit(
            actor,
            AdminAction::Delete,
            Some(id),
            serde_json::to_value(&before).ok(),
            None,
            format!("Deleted diploma {}", before.fields.document_number),
        )
        .await;

        tracing::info!(admin = %actor.admin_username, %id, "Diploma deleted");
        let mut deleted = before;
        deleted.is_active = false;
        deleted.updated_by = Some(actor.admin_username.clone());
        deleted.updated_at = now;
        Ok(deleted)
    }

    pub async fn list(&self, filter: &DiplomaListFilter) -> ApiResult<DiplomaPage> {
        let (items, total) = self.storage.diploma_list(filter).await?;
        Ok(DiplomaPage::new(items, total, filter))
    }

    pub async fn get(&self, id: Uuid) -> ApiResult<DiplomaRecord> {
        self.storage
            .diploma_get(id)
            .await?
            .ok_or_else(ApiError::diploma_not_found)
    }

    /// Audit entries for a record, newest first.
    pub async fn history(&self, id: Uuid) -> ApiResult<Vec<AdminActionLogEntry>> {
        if self.storage.diploma_get(id).await?.is_none() {
            return Err(ApiError::diploma_not_found());
        }
        Ok(self.storage.action_log_for_record(id).await?)
    }

    /// Duplicate check, identifier assignment and insert for validated
    /// content. Shared by the admin form and bulk import.
    ///
    /// Duplicates, inactive records included, come back as
    /// [`ValidationError::DuplicateDocumentNumber`].
    pub async fn persist_new(
        &self,
        fields: DiplomaFields,
        created_by: &str,
    ) -> VerityResult<DiplomaRecord> {
        if self
            .storage
            .diploma_document_number_exists(&fields.document_number)
            .await?
        {
            return Err(ValidationError::DuplicateDocumentNumber {
                document_number: fields.document_number,
            }
            .into());
        }

        let identifier = self
            .identifiers
            .generate(fields.graduation_year, &fields.diploma_type)
            .await?;

        let now = self.clock.now();
        let record = DiplomaRecord {
            id: verity_core::new_entity_id(),
            identifier,
            fields,
            is_active: true,
            created_by: created_by.to_string(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        };

        match self.storage.diploma_insert(&record).await {
            Ok(()) => Ok(record),
            Err(VerityError::Storage(StorageError::UniqueViolation { constraint }))
                if constraint == ACTIVE_NUMBER_CONSTRAINT =>
            {
                Err(ValidationError::DuplicateDocumentNumber {
                    document_number: record.fields.document_number,
                }
                .into())
            }
            Err(e) => Err(e),
        }
    }

    /// Append an audit entry. A failed write is logged; the mutation it
    /// describes has already happened.
    pub async fn audit(
        &self,
        actor: &AuditContext,
        action: AdminAction,
        record_id: Option<Uuid>,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
        description: String,
    ) {
        let entry = AdminActionLogEntry {
            id: verity_core::new_entity_id(),
            admin_username: actor.admin_username.clone(),
            action,
            table_name: DIPLOMA_TABLE.to_string(),
            record_id,
            before,
            after,
            description,
            client_address: actor.client_address.clone(),
            created_at: self.clock.now(),
        };
        if let Err(e) = self.storage.action_log_append(&entry).await {
            tracing::error!(error = %e, %action, "Failed to write admin action log");
        }
    }

    /// Drop every cached projection of `record`, whichever lookup cached it.
    fn invalidate(&self, record: &DiplomaRecord) {
        let removed = self.cache.invalidate_where(|cached| {
            cached.identifier == record.identifier
                || cached.document_number == record.fields.document_number
        });
        if removed > 0 {
            tracing::debug!(
                identifier = %record.identifier,
                removed,
                "Invalidated cached lookups"
            );
        }
    }
}

/// Validate an admin form submission against the create-required fields.
fn validate_form(input: DiplomaInput) -> ApiResult<DiplomaFields> {
    if let Some(content) = input.attachment_content.as_deref() {
        base64::engine::general_purpose::STANDARD
            .decode(content)
            .map_err(|_| ApiError::invalid_format("attachment_content", "base64"))?;
    }
    input.validate(CREATE_REQUIRED).map_err(|missing| {
        missing
            .first()
            .map(|field| ApiError::missing_field(field.name()))
            .unwrap_or_else(|| ApiError::validation_failed("Invalid diploma data"))
    })
}

fn duplicate_on_active_number(err: VerityError, document_number: &str) -> ApiError {
    match err {
        VerityError::Storage(StorageError::UniqueViolation { ref constraint })
            if constraint == ACTIVE_NUMBER_CONSTRAINT =>
        {
            ApiError::duplicate_document_number(document_number)
        }
        other => other.into(),
    }
}
