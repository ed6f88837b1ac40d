//! Error types for Verity operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Storage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Timed out waiting for a storage connection")]
    PoolTimeout,

    #[error("Corrupt row in {table}: {reason}")]
    CorruptRow { table: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Required fields missing: {}", fields.join(", "))]
    RequiredFieldsMissing { fields: Vec<String> },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Document number {document_number} already exists")]
    DuplicateDocumentNumber { document_number: String },

    #[error("Unsupported file: {reason}")]
    UnsupportedFile { reason: String },

    #[error("File is {size} bytes, the limit is {max} bytes")]
    FileTooLarge { size: usize, max: usize },

    #[error("File has {rows} data rows, the limit is {max}")]
    TooManyRows { rows: usize, max: usize },

    #[error("File contains no data rows")]
    NoDataRows,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Anti-automation verification errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerificationError {
    #[error("Verification rejected (score {score:?})")]
    Rejected { score: Option<f64> },

    #[error("Verification service error: {reason}")]
    Upstream { reason: String },
}

/// Master error type for all Verity errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VerityError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Verification error: {0}")]
    Verification(#[from] VerificationError),
}

impl VerityError {
    /// Whether this error came from the storage collaborator.
    pub fn is_storage(&self) -> bool {
        matches!(self, VerityError::Storage(_))
    }
}

/// Result type alias for Verity operations.
pub type VerityResult<T> = Result<T, VerityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_display_lists_every_field() {
        let err = ValidationError::RequiredFieldsMissing {
            fields: vec!["full_name".to_string(), "birth_date".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Required fields missing: full_name, birth_date"
        );
    }

    #[test]
    fn test_master_error_from_storage() {
        let err: VerityError = StorageError::PoolTimeout.into();
        assert!(err.is_storage());
        assert!(err.to_string().contains("Timed out"));
    }

    #[test]
    fn test_duplicate_display() {
        let err = ValidationError::DuplicateDocumentNumber {
            document_number: "B-001".to_string(),
        };
        assert!(err.to_string().contains("B-001"));
    }
}
