//! Verity Test Utilities
//!
//! Shared test infrastructure for the Verity workspace:
//! - Fixtures for complete diploma submissions and stored records
//! - Proptest generators for diploma inputs
//! - Assertions for Verity error classes

// Re-export mock storage and clocks from their source crates
pub use verity_core::ManualClock;
pub use verity_storage::{MockStorage, RegistryStore};

pub use verity_core::{
    DiplomaField, DiplomaFields, DiplomaInput, DiplomaRecord, StorageError, Timestamp,
    ValidationError, VerityError, VerityResult, CREATE_REQUIRED, IMPORT_REQUIRED,
};

use chrono::NaiveDate;

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;

    /// A submission carrying every create-required field plus the optional
    /// ones, already trimmed.
    pub fn sample_diploma_input() -> DiplomaInput {
        sample_diploma_input_for("QH-2023-000123", "20IT001")
    }

    pub fn sample_diploma_input_for(document_number: &str, student_code: &str) -> DiplomaInput {
        DiplomaInput {
            document_number: Some(document_number.to_string()),
            registry_number: Some("SV-2023-0456".to_string()),
            student_code: Some(student_code.to_string()),
            national_id: Some("001201000123".to_string()),
            full_name: Some("Nguyễn Văn An".to_string()),
            birth_date: Some(date(2001, 6, 15)),
            birth_place: Some("Hà Nội".to_string()),
            sex: Some("Nam".to_string()),
            ethnicity: Some("Kinh".to_string()),
            nationality: Some("Việt Nam".to_string()),
            diploma_type: Some("Bằng Cử nhân".to_string()),
            program: Some("Công nghệ thông tin".to_string()),
            program_code: Some("7480201".to_string()),
            specialization: Some("Kỹ thuật phần mềm".to_string()),
            classification: Some("Giỏi".to_string()),
            graduation_year: Some(2023),
            total_credits: Some(130),
            training_format: Some("Chính quy".to_string()),
            training_language: Some("Tiếng Việt".to_string()),
            training_duration: Some("4 năm".to_string()),
            graduation_decision_number: Some("1234/QĐ-ĐHQG".to_string()),
            graduation_decision_date: Some(date(2023, 6, 30)),
            issue_decision_number: Some("1250/QĐ-ĐHQG".to_string()),
            issue_decision_date: Some(date(2023, 7, 10)),
            issuing_unit: Some("Đại học Quốc gia Hà Nội".to_string()),
            issuing_unit_code: Some("DHQG".to_string()),
            signer_name: Some("Trần Thị Bình".to_string()),
            signer_national_id: Some("001080000456".to_string()),
            signer_title: Some("Giám đốc".to_string()),
            issue_place: Some("Hà Nội".to_string()),
            issue_date: Some(date(2023, 7, 15)),
            attachment_name: None,
            attachment_content: None,
        }
    }

    /// Only the import-required fields.
    pub fn minimal_import_input(document_number: &str) -> DiplomaInput {
        let full = sample_diploma_input_for(document_number, "20IT001");
        DiplomaInput {
            document_number: full.document_number,
            registry_number: full.registry_number,
            student_code: full.student_code,
            national_id: full.national_id,
            full_name: full.full_name,
            birth_date: full.birth_date,
            birth_place: full.birth_place,
            program: full.program,
            program_code: full.program_code,
            specialization: full.specialization,
            graduation_decision_number: full.graduation_decision_number,
            graduation_decision_date: full.graduation_decision_date,
            issue_date: full.issue_date,
            signer_name: full.signer_name,
            signer_national_id: full.signer_national_id,
            ..Default::default()
        }
    }

    /// An active stored record built from [`sample_diploma_input_for`].
    pub fn sample_record(document_number: &str, identifier: &str) -> DiplomaRecord {
        let fields = sample_diploma_input_for(document_number, "20IT001")
            .validate(CREATE_REQUIRED)
            .unwrap_or_else(|missing| panic!("fixture misses fields: {missing:?}"));
        let now = chrono::Utc::now();
        DiplomaRecord {
            id: verity_core::new_entity_id(),
            identifier: identifier.to_string(),
            fields,
            is_active: true,
            created_by: "fixture".to_string(),
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for diploma data.

    use super::*;
    use proptest::prelude::*;

    /// Document numbers like `QH-2021-004512`.
    pub fn arb_document_number() -> impl Strategy<Value = String> {
        (2000u32..2030, 1u32..999_999).prop_map(|(y, n)| format!("QH-{y}-{n:06}"))
    }

    /// Student codes like `21IT0042`.
    pub fn arb_student_code() -> impl Strategy<Value = String> {
        "[0-9]{2}[A-Z]{2}[0-9]{4}"
    }

    /// Vietnamese-looking full names, mixed case.
    pub fn arb_full_name() -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["Nguyễn", "Trần", "Lê", "Phạm", "Hoàng"]),
            prop::sample::select(vec!["Văn", "Thị", "Minh", "Thu"]),
            prop::sample::select(vec!["An", "Bình", "Châu", "Dũng", "Hà"]),
        )
            .prop_map(|(a, b, c)| format!("{a} {b} {c}"))
    }

    /// Diploma type labels, with and without diacritics.
    pub fn arb_diploma_type_label() -> impl Strategy<Value = String> {
        prop::sample::select(vec![
            "Bằng Tiến sĩ",
            "Bang Tien si",
            "Bằng Thạc sĩ",
            "THAC SI",
            "Bằng Kỹ sư",
            "ky su",
            "Bằng Cử nhân",
            "Chứng chỉ",
        ])
        .prop_map(str::to_string)
    }

    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (1970i32..2030, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| date(y, m, d))
    }

    /// A complete, valid create submission.
    pub fn arb_diploma_input() -> impl Strategy<Value = DiplomaInput> {
        (
            arb_document_number(),
            arb_student_code(),
            arb_full_name(),
            arb_date(),
            arb_diploma_type_label(),
            2000i32..2030,
        )
            .prop_map(|(number, code, name, birth, diploma_type, year)| {
                let mut input = fixtures::sample_diploma_input_for(&number, &code);
                input.full_name = Some(name);
                input.birth_date = Some(birth);
                input.diploma_type = Some(diploma_type);
                input.graduation_year = Some(year);
                input
            })
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for Verity error classes.

    use super::*;

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &VerityResult<T>) {
        match result {
            Err(VerityError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_storage_error<T: std::fmt::Debug>(result: &VerityResult<T>) {
        match result {
            Err(VerityError::Storage(_)) => {}
            other => panic!("Expected Storage error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_duplicate<T: std::fmt::Debug>(result: &VerityResult<T>) {
        match result {
            Err(VerityError::Validation(ValidationError::DuplicateDocumentNumber { .. })) => {}
            other => panic!("Expected duplicate document number, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sample_input_satisfies_create_set() {
        assert!(fixtures::sample_diploma_input()
            .missing_fields(CREATE_REQUIRED)
            .is_empty());
    }

    #[test]
    fn test_minimal_import_input_only_satisfies_import_set() {
        let input = fixtures::minimal_import_input("QH-1");
        assert!(input.missing_fields(IMPORT_REQUIRED).is_empty());
        assert!(!input.missing_fields(CREATE_REQUIRED).is_empty());
    }

    #[tokio::test]
    async fn test_sample_record_is_insertable() {
        let storage = MockStorage::new();
        let record = fixtures::sample_record("QH-1", "VB-2023-CNH-000001");
        storage.diploma_insert(&record).await.unwrap();
        assert_eq!(storage.diploma_count().unwrap(), 1);
    }

    proptest! {
        #[test]
        fn prop_generated_inputs_validate(input in generators::arb_diploma_input()) {
            prop_assert!(input.validate(CREATE_REQUIRED).is_ok());
        }
    }
}
