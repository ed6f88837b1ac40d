//! Import Service
//!
//! Bulk creation from an uploaded workbook. Whole-file problems (size,
//! format, header, row count) reject the upload before any row is touched.
//! Rows are then processed one at a time; each ends as a [`RowOutcome`] and
//! a failing row never stops the batch. One audit entry describes the file.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use verity_core::{
    AdminAction, DiplomaField, DiplomaInput, ValidationError, VerityError, IMPORT_REQUIRED,
};

use crate::error::{ApiError, ApiResult};
use crate::services::diploma::{AuditContext, DiplomaService};
use crate::spreadsheet::{self, SheetRow};
use crate::telemetry::metrics;

/// Why a row was not imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowRejection {
    MissingFields { fields: Vec<String> },
    InvalidValue { field: String, value: String },
    Duplicate,
    Unexpected,
}

/// A rejected row, identified by its spreadsheet row number (header is 1).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RowError {
    pub row: usize,
    pub document_number: Option<String>,
    pub full_name: Option<String>,
    pub student_code: Option<String>,
    pub reason: RowRejection,
    pub message: String,
}

/// Result of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Imported {
        row: usize,
        id: Uuid,
        identifier: String,
    },
    Rejected(RowError),
}

/// Summary returned for a processed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ImportReport {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub fn from_outcomes(outcomes: Vec<RowOutcome>) -> Self {
        let total = outcomes.len();
        let errors: Vec<RowError> = outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                RowOutcome::Rejected(error) => Some(error),
                RowOutcome::Imported { .. } => None,
            })
            .collect();
        Self {
            total,
            success: total - errors.len(),
            failed: errors.len(),
            errors,
        }
    }
}

/// An uploaded file.
#[derive(Debug, Clone)]
pub struct ImportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ImportLimits {
    pub max_bytes: usize,
    pub max_rows: usize,
    /// Issuing unit code for rows that leave it empty.
    pub default_issuing_unit_code: String,
}

#[derive(Clone)]
pub struct ImportService {
    diplomas: DiplomaService,
    limits: ImportLimits,
}

impl ImportService {
    pub fn new(diplomas: DiplomaService, limits: ImportLimits) -> Self {
        Self { diplomas, limits }
    }

    pub async fn import(&self, file: ImportFile, actor: &AuditContext) -> ApiResult<ImportReport> {
        let size = file.bytes.len();
        if size > self.limits.max_bytes {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.limits.max_bytes,
            }
            .into());
        }

        let sheet = spreadsheet::read_sheet(&file.file_name, file.bytes, self.limits.max_rows)
            .map_err(ApiError::from)?;

        tracing::info!(
            admin = %actor.admin_username,
            file = %file.file_name,
            size,
            rows = sheet.rows.len(),
            "Import started"
        );

        let mut outcomes = Vec::with_capacity(sheet.rows.len());
        for row in &sheet.rows {
            outcomes.push(self.import_row(row, actor).await);
        }
        let report = ImportReport::from_outcomes(outcomes);

        if let Some(metrics) = metrics() {
            metrics.record_import_rows(report.success as u64, report.failed as u64);
        }

        self.diplomas
            .audit(
                actor,
                AdminAction::Import,
                None,
                None,
                Some(serde_json::json!({
                    "file_name": file.file_name,
                    "size": size,
                    "total": report.total,
                    "success": report.success,
                    "failed": report.failed,
                })),
                format!(
                    "Imported {} of {} rows from {}",
                    report.success, report.total, file.file_name
                ),
            )
            .await;

        tracing::info!(
            admin = %actor.admin_username,
            total = report.total,
            success = report.success,
            failed = report.failed,
            "Import finished"
        );
        Ok(report)
    }

    async fn import_row(&self, row: &SheetRow, actor: &AuditContext) -> RowOutcome {
        let reject = |reason: RowRejection, message: String| {
            RowOutcome::Rejected(RowError {
                row: row.row,
                document_number: row.text(DiplomaField::DocumentNumber),
                full_name: row.text(DiplomaField::FullName),
                student_code: row.text(DiplomaField::StudentCode),
                reason,
                message,
            })
        };

        let input = match row.to_input() {
            Ok(input) => self.with_defaults(input),
            Err(invalid) => {
                let message = format!(
                    "Invalid value '{}' in column '{}'",
                    invalid.value,
                    invalid.field.column_label()
                );
                return reject(
                    RowRejection::InvalidValue {
                        field: invalid.field.name().to_string(),
                        value: invalid.value,
                    },
                    message,
                );
            }
        };

        let fields = match input.validate(IMPORT_REQUIRED) {
            Ok(fields) => fields,
            Err(missing) => {
                let labels: Vec<&str> = missing.iter().map(|f| f.column_label()).collect();
                return reject(
                    RowRejection::MissingFields {
                        fields: missing.iter().map(|f| f.name().to_string()).collect(),
                    },
                    format!("Missing required fields: {}", labels.join(", ")),
                );
            }
        };

        match self.diplomas.persist_new(fields, &actor.admin_username).await {
            Ok(record) => RowOutcome::Imported {
                row: row.row,
                id: record.id,
                identifier: record.identifier,
            },
            Err(VerityError::Validation(ValidationError::DuplicateDocumentNumber {
                document_number,
            })) => reject(
                RowRejection::Duplicate,
                format!("Document number '{document_number}' already exists"),
            ),
            Err(e) => {
                tracing::error!(row = row.row, error = %e, "Import row failed");
                reject(
                    RowRejection::Unexpected,
                    "Unexpected error while saving this row".to_string(),
                )
            }
        }
    }

    fn with_defaults(&self, mut input: DiplomaInput) -> DiplomaInput {
        let blank = input
            .issuing_unit_code
            .as_deref()
            .map_or(true, |code| code.trim().is_empty());
        if blank {
            input.issuing_unit_code = Some(self.limits.default_issuing_unit_code.clone());
        }
        input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::services::identifier::IdentifierGenerator;
    use crate::spreadsheet::{cells_for, CellValue};
    use rust_xlsxwriter::Workbook;
    use std::sync::Arc;
    use verity_core::{DiplomaListFilter, ManualClock, PublicDiploma};
    use verity_storage::{CacheConfig, RegistryStore, TtlCache};
    use verity_test_utils::{fixtures, MockStorage};

    fn service(storage: &MockStorage) -> ImportService {
        let store: Arc<dyn RegistryStore> = Arc::new(storage.clone());
        let clock = Arc::new(ManualClock::default());
        let cache: Arc<TtlCache<PublicDiploma>> =
            Arc::new(TtlCache::with_clock(CacheConfig::default(), clock.clone()));
        let diplomas = DiplomaService::new(
            store.clone(),
            IdentifierGenerator::new(store, "VB"),
            cache,
            clock,
        );
        ImportService::new(
            diplomas,
            ImportLimits {
                max_bytes: 5 * 1024 * 1024,
                max_rows: 1000,
                default_issuing_unit_code: "DHQG".to_string(),
            },
        )
    }

    fn actor() -> AuditContext {
        AuditContext::new("registrar", "10.0.0.5")
    }

    /// Workbook with the dictionary header and one row per input.
    fn workbook(rows: &[DiplomaInput]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        for (col, field) in DiplomaField::ALL.iter().enumerate() {
            sheet
                .write_string(0, col as u16, field.column_label())
                .unwrap();
        }
        for (index, input) in rows.iter().enumerate() {
            let row = index as u32 + 1;
            for (col, (_, value)) in cells_for(input).into_iter().enumerate() {
                match value {
                    CellValue::Number(n) => {
                        sheet.write_number(row, col as u16, n).unwrap();
                    }
                    CellValue::Empty => {}
                    other => {
                        sheet.write_string(row, col as u16, other.display()).unwrap();
                    }
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    fn file(bytes: Vec<u8>) -> ImportFile {
        ImportFile {
            file_name: "batch.xlsx".to_string(),
            bytes,
        }
    }

    #[tokio::test]
    async fn test_three_row_sheet_reports_one_success_two_failures() {
        let storage = MockStorage::new();
        let valid = fixtures::minimal_import_input("QH-2023-000001");
        let missing = DiplomaInput {
            full_name: None,
            ..fixtures::minimal_import_input("QH-2023-000002")
        };
        let duplicate = fixtures::minimal_import_input("QH-2023-000001");

        let report = service(&storage)
            .import(file(workbook(&[valid, missing, duplicate])), &actor())
            .await
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.success, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.errors[0].row, 3);
        assert_eq!(
            report.errors[0].reason,
            RowRejection::MissingFields {
                fields: vec!["full_name".to_string()]
            }
        );
        assert_eq!(report.errors[1].row, 4);
        assert_eq!(report.errors[1].reason, RowRejection::Duplicate);
        assert_eq!(
            report.errors[1].document_number.as_deref(),
            Some("QH-2023-000001")
        );
        assert_eq!(storage.diploma_count().unwrap(), 1);

        let logs = storage.action_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, AdminAction::Import);
        assert_eq!(logs[0].after.as_ref().unwrap()["failed"], 2);
    }

    #[tokio::test]
    async fn test_defaults_applied_to_imported_rows() {
        let storage = MockStorage::new();
        let report = service(&storage)
            .import(
                file(workbook(&[fixtures::minimal_import_input("QH-9")])),
                &actor(),
            )
            .await
            .unwrap();
        assert_eq!(report.success, 1);

        let (records, _) = storage
            .diploma_list(&DiplomaListFilter::default())
            .await
            .unwrap();
        let fields = &records[0].fields;
        assert_eq!(fields.diploma_type, "Bằng Cử nhân");
        assert_eq!(fields.nationality, "Việt Nam");
        assert_eq!(fields.issuing_unit_code.as_deref(), Some("DHQG"));
        assert_eq!(fields.graduation_year, 2023);
        assert_eq!(records[0].created_by, "registrar");
        assert_eq!(records[0].identifier, "VB-2023-CNH-000001");
    }

    #[tokio::test]
    async fn test_malformed_date_is_invalid_value() {
        let storage = MockStorage::new();
        let mut book = Workbook::new();
        let sheet = book.add_worksheet();
        let input = fixtures::minimal_import_input("QH-5");
        for (col, (field, value)) in cells_for(&input).into_iter().enumerate() {
            sheet.write_string(0, col as u16, field.column_label()).unwrap();
            let text = if field == DiplomaField::BirthDate {
                "31/31/2001".to_string()
            } else {
                value.display()
            };
            if !text.is_empty() {
                sheet.write_string(1, col as u16, text).unwrap();
            }
        }
        let bytes = book.save_to_buffer().unwrap();

        let report = service(&storage).import(file(bytes), &actor()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(
            report.errors[0].reason,
            RowRejection::InvalidValue {
                field: "birth_date".to_string(),
                value: "31/31/2001".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_storage_failure_rejects_only_that_row() {
        let storage = MockStorage::new();
        storage.fail_insert_for("QH-BAD").unwrap();
        let report = service(&storage)
            .import(
                file(workbook(&[
                    fixtures::minimal_import_input("QH-BAD"),
                    fixtures::minimal_import_input("QH-GOOD"),
                ])),
                &actor(),
            )
            .await
            .unwrap();
        assert_eq!(report.success, 1);
        assert_eq!(report.errors[0].reason, RowRejection::Unexpected);
        assert_eq!(report.errors[0].row, 2);
    }

    #[tokio::test]
    async fn test_whole_file_rejections_write_nothing() {
        let storage = MockStorage::new();
        let svc = service(&storage);

        let too_big = ImportFile {
            file_name: "big.xlsx".to_string(),
            bytes: vec![0u8; 5 * 1024 * 1024 + 1],
        };
        let err = svc.import(too_big, &actor()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PayloadTooLarge);

        let csv = ImportFile {
            file_name: "list.csv".to_string(),
            bytes: b"a,b\n1,2".to_vec(),
        };
        let err = svc.import(csv, &actor()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::UnsupportedFile);

        let header_only = svc.import(file(workbook(&[])), &actor()).await.unwrap_err();
        assert_eq!(header_only.code, ErrorCode::ValidationFailed);

        assert!(storage.action_logs().unwrap().is_empty());
        assert_eq!(storage.diploma_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_row_limit() {
        let storage = MockStorage::new();
        let svc = ImportService {
            limits: ImportLimits {
                max_rows: 2,
                ..svc_limits()
            },
            ..service(&storage)
        };
        let rows: Vec<DiplomaInput> = (0..3)
            .map(|i| fixtures::minimal_import_input(&format!("QH-{i}")))
            .collect();
        let err = svc.import(file(workbook(&rows)), &actor()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert_eq!(storage.diploma_count().unwrap(), 0);
    }

    fn svc_limits() -> ImportLimits {
        ImportLimits {
            max_bytes: 5 * 1024 * 1024,
            max_rows: 1000,
            default_issuing_unit_code: "DHQG".to_string(),
        }
    }

    #[test]
    fn test_report_from_outcomes() {
        let report = ImportReport::from_outcomes(vec![
            RowOutcome::Imported {
                row: 2,
                id: Uuid::now_v7(),
                identifier: "VB-2023-CNH-000001".to_string(),
            },
            RowOutcome::Rejected(RowError {
                row: 3,
                document_number: None,
                full_name: None,
                student_code: None,
                reason: RowRejection::Unexpected,
                message: "boom".to_string(),
            }),
        ]);
        assert_eq!((report.total, report.success, report.failed), (2, 1, 1));
    }
}
