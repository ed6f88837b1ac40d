//! Diploma records and their field dictionary.
//!
//! A diploma travels through three shapes:
//! - [`DiplomaInput`]: what an admin form or a spreadsheet row submits. Every
//!   field is optional so validation can report all missing fields at once.
//! - [`DiplomaFields`]: the validated content, with the always-required
//!   fields made non-optional.
//! - [`DiplomaRecord`]: stored row = fields + identity, identifier, soft-delete
//!   flag and audit columns.
//!
//! [`PublicDiploma`] is the projection handed to anonymous search callers.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{EntityId, Timestamp};

/// Diploma type applied when an imported row leaves the column empty.
pub const DEFAULT_DIPLOMA_TYPE: &str = "Bằng Cử nhân";

/// Nationality applied when an imported row leaves the column empty.
pub const DEFAULT_NATIONALITY: &str = "Việt Nam";

// ============================================================================
// FIELD DICTIONARY
// ============================================================================

/// Every user-supplied diploma field, in form order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DiplomaField {
    DocumentNumber,
    RegistryNumber,
    StudentCode,
    NationalId,
    FullName,
    BirthDate,
    BirthPlace,
    Sex,
    Ethnicity,
    Nationality,
    DiplomaType,
    Program,
    ProgramCode,
    Specialization,
    Classification,
    GraduationYear,
    TotalCredits,
    TrainingFormat,
    TrainingLanguage,
    TrainingDuration,
    GraduationDecisionNumber,
    GraduationDecisionDate,
    IssueDecisionNumber,
    IssueDecisionDate,
    IssuingUnit,
    IssuingUnitCode,
    SignerName,
    SignerNationalId,
    SignerTitle,
    IssuePlace,
    IssueDate,
}

/// Fields a spreadsheet row must carry.
pub const IMPORT_REQUIRED: &[DiplomaField] = &[
    DiplomaField::DocumentNumber,
    DiplomaField::RegistryNumber,
    DiplomaField::StudentCode,
    DiplomaField::NationalId,
    DiplomaField::FullName,
    DiplomaField::BirthDate,
    DiplomaField::BirthPlace,
    DiplomaField::Program,
    DiplomaField::ProgramCode,
    DiplomaField::Specialization,
    DiplomaField::GraduationDecisionNumber,
    DiplomaField::GraduationDecisionDate,
    DiplomaField::IssueDate,
    DiplomaField::SignerName,
    DiplomaField::SignerNationalId,
];

/// Fields the admin create form must carry (27), in form order.
pub const CREATE_REQUIRED: &[DiplomaField] = &[
    DiplomaField::DocumentNumber,
    DiplomaField::RegistryNumber,
    DiplomaField::StudentCode,
    DiplomaField::NationalId,
    DiplomaField::FullName,
    DiplomaField::BirthDate,
    DiplomaField::BirthPlace,
    DiplomaField::Sex,
    DiplomaField::Ethnicity,
    DiplomaField::Nationality,
    DiplomaField::DiplomaType,
    DiplomaField::Program,
    DiplomaField::ProgramCode,
    DiplomaField::Specialization,
    DiplomaField::Classification,
    DiplomaField::GraduationYear,
    DiplomaField::TrainingFormat,
    DiplomaField::TrainingLanguage,
    DiplomaField::TrainingDuration,
    DiplomaField::GraduationDecisionNumber,
    DiplomaField::GraduationDecisionDate,
    DiplomaField::IssuingUnit,
    DiplomaField::IssuingUnitCode,
    DiplomaField::SignerName,
    DiplomaField::SignerNationalId,
    DiplomaField::SignerTitle,
    DiplomaField::IssueDate,
];

impl DiplomaField {
    /// All fields in form order.
    pub const ALL: [DiplomaField; 31] = [
        DiplomaField::DocumentNumber,
        DiplomaField::RegistryNumber,
        DiplomaField::StudentCode,
        DiplomaField::NationalId,
        DiplomaField::FullName,
        DiplomaField::BirthDate,
        DiplomaField::BirthPlace,
        DiplomaField::Sex,
        DiplomaField::Ethnicity,
        DiplomaField::Nationality,
        DiplomaField::DiplomaType,
        DiplomaField::Program,
        DiplomaField::ProgramCode,
        DiplomaField::Specialization,
        DiplomaField::Classification,
        DiplomaField::GraduationYear,
        DiplomaField::TotalCredits,
        DiplomaField::TrainingFormat,
        DiplomaField::TrainingLanguage,
        DiplomaField::TrainingDuration,
        DiplomaField::GraduationDecisionNumber,
        DiplomaField::GraduationDecisionDate,
        DiplomaField::IssueDecisionNumber,
        DiplomaField::IssueDecisionDate,
        DiplomaField::IssuingUnit,
        DiplomaField::IssuingUnitCode,
        DiplomaField::SignerName,
        DiplomaField::SignerNationalId,
        DiplomaField::SignerTitle,
        DiplomaField::IssuePlace,
        DiplomaField::IssueDate,
    ];

    /// Wire name (JSON key, audit snapshots, error messages).
    pub fn name(&self) -> &'static str {
        match self {
            DiplomaField::DocumentNumber => "document_number",
            DiplomaField::RegistryNumber => "registry_number",
            DiplomaField::StudentCode => "student_code",
            DiplomaField::NationalId => "national_id",
            DiplomaField::FullName => "full_name",
            DiplomaField::BirthDate => "birth_date",
            DiplomaField::BirthPlace => "birth_place",
            DiplomaField::Sex => "sex",
            DiplomaField::Ethnicity => "ethnicity",
            DiplomaField::Nationality => "nationality",
            DiplomaField::DiplomaType => "diploma_type",
            DiplomaField::Program => "program",
            DiplomaField::ProgramCode => "program_code",
            DiplomaField::Specialization => "specialization",
            DiplomaField::Classification => "classification",
            DiplomaField::GraduationYear => "graduation_year",
            DiplomaField::TotalCredits => "total_credits",
            DiplomaField::TrainingFormat => "training_format",
            DiplomaField::TrainingLanguage => "training_language",
            DiplomaField::TrainingDuration => "training_duration",
            DiplomaField::GraduationDecisionNumber => "graduation_decision_number",
            DiplomaField::GraduationDecisionDate => "graduation_decision_date",
            DiplomaField::IssueDecisionNumber => "issue_decision_number",
            DiplomaField::IssueDecisionDate => "issue_decision_date",
            DiplomaField::IssuingUnit => "issuing_unit",
            DiplomaField::IssuingUnitCode => "issuing_unit_code",
            DiplomaField::SignerName => "signer_name",
            DiplomaField::SignerNationalId => "signer_national_id",
            DiplomaField::SignerTitle => "signer_title",
            DiplomaField::IssuePlace => "issue_place",
            DiplomaField::IssueDate => "issue_date",
        }
    }

    /// Spreadsheet column header used by import and the template.
    pub fn column_label(&self) -> &'static str {
        match self {
            DiplomaField::DocumentNumber => "Số hiệu văn bằng",
            DiplomaField::RegistryNumber => "Số vào sổ cấp bằng",
            DiplomaField::StudentCode => "Mã sinh viên",
            DiplomaField::NationalId => "Số CCCD",
            DiplomaField::FullName => "Họ và tên",
            DiplomaField::BirthDate => "Ngày sinh",
            DiplomaField::BirthPlace => "Nơi sinh",
            DiplomaField::Sex => "Giới tính",
            DiplomaField::Ethnicity => "Dân tộc",
            DiplomaField::Nationality => "Quốc tịch",
            DiplomaField::DiplomaType => "Loại văn bằng",
            DiplomaField::Program => "Ngành đào tạo",
            DiplomaField::ProgramCode => "Mã ngành",
            DiplomaField::Specialization => "Chuyên ngành",
            DiplomaField::Classification => "Xếp loại tốt nghiệp",
            DiplomaField::GraduationYear => "Năm tốt nghiệp",
            DiplomaField::TotalCredits => "Tổng số tín chỉ",
            DiplomaField::TrainingFormat => "Hình thức đào tạo",
            DiplomaField::TrainingLanguage => "Ngôn ngữ đào tạo",
            DiplomaField::TrainingDuration => "Thời gian đào tạo",
            DiplomaField::GraduationDecisionNumber => "Số quyết định công nhận tốt nghiệp",
            DiplomaField::GraduationDecisionDate => "Ngày quyết định công nhận tốt nghiệp",
            DiplomaField::IssueDecisionNumber => "Số quyết định cấp bằng",
            DiplomaField::IssueDecisionDate => "Ngày quyết định cấp bằng",
            DiplomaField::IssuingUnit => "Đơn vị cấp bằng",
            DiplomaField::IssuingUnitCode => "Mã đơn vị cấp bằng",
            DiplomaField::SignerName => "Họ tên người ký",
            DiplomaField::SignerNationalId => "Số CCCD người ký",
            DiplomaField::SignerTitle => "Chức danh người ký",
            DiplomaField::IssuePlace => "Nơi cấp",
            DiplomaField::IssueDate => "Ngày cấp",
        }
    }

    /// Resolve a spreadsheet header back to its field.
    pub fn from_column_label(label: &str) -> Option<DiplomaField> {
        let label = label.trim();
        DiplomaField::ALL
            .iter()
            .copied()
            .find(|field| field.column_label() == label)
    }

    pub fn is_date(&self) -> bool {
        matches!(
            self,
            DiplomaField::BirthDate
                | DiplomaField::GraduationDecisionDate
                | DiplomaField::IssueDecisionDate
                | DiplomaField::IssueDate
        )
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, DiplomaField::GraduationYear | DiplomaField::TotalCredits)
    }
}

impl std::fmt::Display for DiplomaField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// INPUT
// ============================================================================

/// Unvalidated diploma content from a form or spreadsheet row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DiplomaInput {
    pub document_number: Option<String>,
    pub registry_number: Option<String>,
    pub student_code: Option<String>,
    pub national_id: Option<String>,
    pub full_name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub birth_place: Option<String>,
    pub sex: Option<String>,
    pub ethnicity: Option<String>,
    pub nationality: Option<String>,
    pub diploma_type: Option<String>,
    pub program: Option<String>,
    pub program_code: Option<String>,
    pub specialization: Option<String>,
    pub classification: Option<String>,
    pub graduation_year: Option<i32>,
    pub total_credits: Option<i32>,
    pub training_format: Option<String>,
    pub training_language: Option<String>,
    pub training_duration: Option<String>,
    pub graduation_decision_number: Option<String>,
    pub graduation_decision_date: Option<NaiveDate>,
    pub issue_decision_number: Option<String>,
    pub issue_decision_date: Option<NaiveDate>,
    pub issuing_unit: Option<String>,
    pub issuing_unit_code: Option<String>,
    pub signer_name: Option<String>,
    pub signer_national_id: Option<String>,
    pub signer_title: Option<String>,
    pub issue_place: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub attachment_name: Option<String>,
    /// Base64-encoded attachment bytes.
    pub attachment_content: Option<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl DiplomaInput {
    /// Trim every text field and turn blank values into `None`.
    pub fn normalized(self) -> Self {
        Self {
            document_number: clean(self.document_number),
            registry_number: clean(self.registry_number),
            student_code: clean(self.student_code),
            national_id: clean(self.national_id),
            full_name: clean(self.full_name),
            birth_date: self.birth_date,
            birth_place: clean(self.birth_place),
            sex: clean(self.sex),
            ethnicity: clean(self.ethnicity),
            nationality: clean(self.nationality),
            diploma_type: clean(self.diploma_type),
            program: clean(self.program),
            program_code: clean(self.program_code),
            specialization: clean(self.specialization),
            classification: clean(self.classification),
            graduation_year: self.graduation_year,
            total_credits: self.total_credits,
            training_format: clean(self.training_format),
            training_language: clean(self.training_language),
            training_duration: clean(self.training_duration),
            graduation_decision_number: clean(self.graduation_decision_number),
            graduation_decision_date: self.graduation_decision_date,
            issue_decision_number: clean(self.issue_decision_number),
            issue_decision_date: self.issue_decision_date,
            issuing_unit: clean(self.issuing_unit),
            issuing_unit_code: clean(self.issuing_unit_code),
            signer_name: clean(self.signer_name),
            signer_national_id: clean(self.signer_national_id),
            signer_title: clean(self.signer_title),
            issue_place: clean(self.issue_place),
            issue_date: self.issue_date,
            attachment_name: clean(self.attachment_name),
            attachment_content: clean(self.attachment_content),
        }
    }

    /// Whether a field carries a non-blank value.
    pub fn is_present(&self, field: DiplomaField) -> bool {
        match field {
            DiplomaField::DocumentNumber => present(&self.document_number),
            DiplomaField::RegistryNumber => present(&self.registry_number),
            DiplomaField::StudentCode => present(&self.student_code),
            DiplomaField::NationalId => present(&self.national_id),
            DiplomaField::FullName => present(&self.full_name),
            DiplomaField::BirthDate => self.birth_date.is_some(),
            DiplomaField::BirthPlace => present(&self.birth_place),
            DiplomaField::Sex => present(&self.sex),
            DiplomaField::Ethnicity => present(&self.ethnicity),
            DiplomaField::Nationality => present(&self.nationality),
            DiplomaField::DiplomaType => present(&self.diploma_type),
            DiplomaField::Program => present(&self.program),
            DiplomaField::ProgramCode => present(&self.program_code),
            DiplomaField::Specialization => present(&self.specialization),
            DiplomaField::Classification => present(&self.classification),
            DiplomaField::GraduationYear => self.graduation_year.is_some(),
            DiplomaField::TotalCredits => self.total_credits.is_some(),
            DiplomaField::TrainingFormat => present(&self.training_format),
            DiplomaField::TrainingLanguage => present(&self.training_language),
            DiplomaField::TrainingDuration => present(&self.training_duration),
            DiplomaField::GraduationDecisionNumber => present(&self.graduation_decision_number),
            DiplomaField::GraduationDecisionDate => self.graduation_decision_date.is_some(),
            DiplomaField::IssueDecisionNumber => present(&self.issue_decision_number),
            DiplomaField::IssueDecisionDate => self.issue_decision_date.is_some(),
            DiplomaField::IssuingUnit => present(&self.issuing_unit),
            DiplomaField::IssuingUnitCode => present(&self.issuing_unit_code),
            DiplomaField::SignerName => present(&self.signer_name),
            DiplomaField::SignerNationalId => present(&self.signer_national_id),
            DiplomaField::SignerTitle => present(&self.signer_title),
            DiplomaField::IssuePlace => present(&self.issue_place),
            DiplomaField::IssueDate => self.issue_date.is_some(),
        }
    }

    /// Required fields without a value, in the order given.
    pub fn missing_fields(&self, required: &[DiplomaField]) -> Vec<DiplomaField> {
        required
            .iter()
            .copied()
            .filter(|field| !self.is_present(*field))
            .collect()
    }

    /// Validate against `required` and produce the stored field set.
    ///
    /// The import-required fields are always enforced because the stored
    /// record cannot exist without them. The graduation year falls back to
    /// the issue date's year, diploma type and nationality to their defaults.
    pub fn validate(self, required: &[DiplomaField]) -> Result<DiplomaFields, Vec<DiplomaField>> {
        let input = self.normalized();

        let mut missing = input.missing_fields(required);
        for field in input.missing_fields(IMPORT_REQUIRED) {
            if !missing.contains(&field) {
                missing.push(field);
            }
        }
        if !missing.is_empty() {
            return Err(missing);
        }

        let (
            Some(document_number),
            Some(registry_number),
            Some(student_code),
            Some(national_id),
            Some(full_name),
            Some(birth_date),
            Some(birth_place),
            Some(program),
            Some(program_code),
            Some(specialization),
            Some(graduation_decision_number),
            Some(graduation_decision_date),
            Some(issue_date),
            Some(signer_name),
            Some(signer_national_id),
        ) = (
            input.document_number,
            input.registry_number,
            input.student_code,
            input.national_id,
            input.full_name,
            input.birth_date,
            input.birth_place,
            input.program,
            input.program_code,
            input.specialization,
            input.graduation_decision_number,
            input.graduation_decision_date,
            input.issue_date,
            input.signer_name,
            input.signer_national_id,
        )
        else {
            return Err(IMPORT_REQUIRED.to_vec());
        };

        Ok(DiplomaFields {
            document_number,
            registry_number,
            student_code,
            national_id,
            full_name,
            birth_date,
            birth_place,
            sex: input.sex,
            ethnicity: input.ethnicity,
            nationality: input
                .nationality
                .unwrap_or_else(|| DEFAULT_NATIONALITY.to_string()),
            diploma_type: input
                .diploma_type
                .unwrap_or_else(|| DEFAULT_DIPLOMA_TYPE.to_string()),
            program,
            program_code,
            specialization,
            classification: input.classification,
            graduation_year: input.graduation_year.unwrap_or_else(|| issue_date.year()),
            total_credits: input.total_credits,
            training_format: input.training_format,
            training_language: input.training_language,
            training_duration: input.training_duration,
            graduation_decision_number,
            graduation_decision_date,
            issue_decision_number: input.issue_decision_number,
            issue_decision_date: input.issue_decision_date,
            issuing_unit: input.issuing_unit,
            issuing_unit_code: input.issuing_unit_code,
            signer_name,
            signer_national_id,
            signer_title: input.signer_title,
            issue_place: input.issue_place,
            issue_date,
            attachment_name: input.attachment_name,
            attachment_content: input.attachment_content,
        })
    }
}

// ============================================================================
// VALIDATED FIELDS
// ============================================================================

/// Validated diploma content (everything an admin may edit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DiplomaFields {
    pub document_number: String,
    pub registry_number: String,
    pub student_code: String,
    pub national_id: String,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub birth_place: String,
    pub sex: Option<String>,
    pub ethnicity: Option<String>,
    pub nationality: String,
    pub diploma_type: String,
    pub program: String,
    pub program_code: String,
    pub specialization: String,
    pub classification: Option<String>,
    pub graduation_year: i32,
    pub total_credits: Option<i32>,
    pub training_format: Option<String>,
    pub training_language: Option<String>,
    pub training_duration: Option<String>,
    pub graduation_decision_number: String,
    pub graduation_decision_date: NaiveDate,
    pub issue_decision_number: Option<String>,
    pub issue_decision_date: Option<NaiveDate>,
    pub issuing_unit: Option<String>,
    pub issuing_unit_code: Option<String>,
    pub signer_name: String,
    pub signer_national_id: String,
    pub signer_title: Option<String>,
    pub issue_place: Option<String>,
    pub issue_date: NaiveDate,
    pub attachment_name: Option<String>,
    pub attachment_content: Option<String>,
}

impl DiplomaFields {
    /// Back to the submission shape, e.g. to prefill an edit form.
    pub fn to_input(&self) -> DiplomaInput {
        DiplomaInput {
            document_number: Some(self.document_number.clone()),
            registry_number: Some(self.registry_number.clone()),
            student_code: Some(self.student_code.clone()),
            national_id: Some(self.national_id.clone()),
            full_name: Some(self.full_name.clone()),
            birth_date: Some(self.birth_date),
            birth_place: Some(self.birth_place.clone()),
            sex: self.sex.clone(),
            ethnicity: self.ethnicity.clone(),
            nationality: Some(self.nationality.clone()),
            diploma_type: Some(self.diploma_type.clone()),
            program: Some(self.program.clone()),
            program_code: Some(self.program_code.clone()),
            specialization: Some(self.specialization.clone()),
            classification: self.classification.clone(),
            graduation_year: Some(self.graduation_year),
            total_credits: self.total_credits,
            training_format: self.training_format.clone(),
            training_language: self.training_language.clone(),
            training_duration: self.training_duration.clone(),
            graduation_decision_number: Some(self.graduation_decision_number.clone()),
            graduation_decision_date: Some(self.graduation_decision_date),
            issue_decision_number: self.issue_decision_number.clone(),
            issue_decision_date: self.issue_decision_date,
            issuing_unit: self.issuing_unit.clone(),
            issuing_unit_code: self.issuing_unit_code.clone(),
            signer_name: Some(self.signer_name.clone()),
            signer_national_id: Some(self.signer_national_id.clone()),
            signer_title: self.signer_title.clone(),
            issue_place: self.issue_place.clone(),
            issue_date: Some(self.issue_date),
            attachment_name: self.attachment_name.clone(),
            attachment_content: self.attachment_content.clone(),
        }
    }
}

// ============================================================================
// STORED RECORD
// ============================================================================

/// One issued diploma as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DiplomaRecord {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    /// System-generated code, assigned once at creation.
    pub identifier: String,
    #[serde(flatten)]
    pub fields: DiplomaFields,
    pub is_active: bool,
    pub created_by: String,
    pub updated_by: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub updated_at: Timestamp,
}

// ============================================================================
// PUBLIC PROJECTION
// ============================================================================

/// What an anonymous lookup may see.
///
/// Leaves out internal ids, national ID numbers, attachment content and the
/// audit columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PublicDiploma {
    pub identifier: String,
    pub document_number: String,
    pub registry_number: String,
    pub student_code: String,
    pub full_name: String,
    pub birth_date: NaiveDate,
    pub birth_place: String,
    pub sex: Option<String>,
    pub ethnicity: Option<String>,
    pub nationality: String,
    pub diploma_type: String,
    pub program: String,
    pub program_code: String,
    pub specialization: String,
    pub classification: Option<String>,
    pub graduation_year: i32,
    pub training_format: Option<String>,
    pub training_language: Option<String>,
    pub training_duration: Option<String>,
    pub graduation_decision_number: String,
    pub graduation_decision_date: NaiveDate,
    pub issuing_unit: Option<String>,
    pub signer_name: String,
    pub signer_title: Option<String>,
    pub issue_place: Option<String>,
    pub issue_date: NaiveDate,
    pub has_attachment: bool,
}

impl From<&DiplomaRecord> for PublicDiploma {
    fn from(record: &DiplomaRecord) -> Self {
        let f = &record.fields;
        Self {
            identifier: record.identifier.clone(),
            document_number: f.document_number.clone(),
            registry_number: f.registry_number.clone(),
            student_code: f.student_code.clone(),
            full_name: f.full_name.clone(),
            birth_date: f.birth_date,
            birth_place: f.birth_place.clone(),
            sex: f.sex.clone(),
            ethnicity: f.ethnicity.clone(),
            nationality: f.nationality.clone(),
            diploma_type: f.diploma_type.clone(),
            program: f.program.clone(),
            program_code: f.program_code.clone(),
            specialization: f.specialization.clone(),
            classification: f.classification.clone(),
            graduation_year: f.graduation_year,
            training_format: f.training_format.clone(),
            training_language: f.training_language.clone(),
            training_duration: f.training_duration.clone(),
            graduation_decision_number: f.graduation_decision_number.clone(),
            graduation_decision_date: f.graduation_decision_date,
            issuing_unit: f.issuing_unit.clone(),
            signer_name: f.signer_name.clone(),
            signer_title: f.signer_title.clone(),
            issue_place: f.issue_place.clone(),
            issue_date: f.issue_date,
            has_attachment: f.attachment_content.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
    }

    fn minimal_input() -> DiplomaInput {
        DiplomaInput {
            document_number: Some("QH-2023-000123".to_string()),
            registry_number: Some("SV-123".to_string()),
            student_code: Some("20IT001".to_string()),
            national_id: Some("001200000001".to_string()),
            full_name: Some("Nguyễn Văn An".to_string()),
            birth_date: Some(date(2001, 6, 15)),
            birth_place: Some("Hà Nội".to_string()),
            program: Some("Công nghệ thông tin".to_string()),
            program_code: Some("7480201".to_string()),
            specialization: Some("Kỹ thuật phần mềm".to_string()),
            graduation_decision_number: Some("123/QĐ-ĐHQG".to_string()),
            graduation_decision_date: Some(date(2023, 6, 30)),
            issue_date: Some(date(2023, 7, 15)),
            signer_name: Some("Trần Thị Bình".to_string()),
            signer_national_id: Some("001080000002".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_required_sets_have_expected_sizes() {
        assert_eq!(IMPORT_REQUIRED.len(), 15);
        assert_eq!(CREATE_REQUIRED.len(), 27);
        for field in IMPORT_REQUIRED {
            assert!(CREATE_REQUIRED.contains(field), "{field} missing from create set");
        }
    }

    #[test]
    fn test_column_labels_are_unique_and_resolvable() {
        for field in DiplomaField::ALL {
            assert_eq!(DiplomaField::from_column_label(field.column_label()), Some(field));
        }
        let mut labels: Vec<_> = DiplomaField::ALL.iter().map(|f| f.column_label()).collect();
        labels.sort_unstable();
        labels.dedup();
        assert_eq!(labels.len(), DiplomaField::ALL.len());
    }

    #[test]
    fn test_validate_applies_defaults() {
        let fields = minimal_input()
            .validate(IMPORT_REQUIRED)
            .expect("minimal input should validate");
        assert_eq!(fields.diploma_type, DEFAULT_DIPLOMA_TYPE);
        assert_eq!(fields.nationality, DEFAULT_NATIONALITY);
        assert_eq!(fields.graduation_year, 2023);
    }

    #[test]
    fn test_validate_reports_blank_fields_as_missing() {
        let mut input = minimal_input();
        input.full_name = Some("   ".to_string());
        input.birth_date = None;
        let missing = input.validate(IMPORT_REQUIRED).unwrap_err();
        assert_eq!(missing, vec![DiplomaField::FullName, DiplomaField::BirthDate]);
    }

    #[test]
    fn test_create_set_reports_first_missing_in_form_order() {
        let missing = minimal_input().validate(CREATE_REQUIRED).unwrap_err();
        assert_eq!(missing.first(), Some(&DiplomaField::Sex));
    }

    #[test]
    fn test_fields_round_trip_through_input() {
        let input = minimal_input().normalized();
        let fields = input.clone().validate(IMPORT_REQUIRED).expect("valid");
        let back = fields.to_input();
        assert_eq!(back.document_number, input.document_number);
        assert_eq!(back.signer_national_id, input.signer_national_id);
        assert_eq!(back.graduation_year, Some(2023));
    }

    #[test]
    fn test_public_projection_hides_sensitive_fields() -> Result<(), serde_json::Error> {
        let mut fields = minimal_input().validate(IMPORT_REQUIRED).expect("valid");
        fields.attachment_content = Some("aGVsbG8=".to_string());
        let record = DiplomaRecord {
            id: crate::new_entity_id(),
            identifier: "VB-2023-CNH-000001".to_string(),
            fields,
            is_active: true,
            created_by: "admin".to_string(),
            updated_by: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let public = PublicDiploma::from(&record);
        assert!(public.has_attachment);
        let json = serde_json::to_string(&public)?;
        assert!(!json.contains("national_id"));
        assert!(!json.contains("aGVsbG8="));
        assert!(!json.contains("created_by"));
        Ok(())
    }
}
