//! Verity Core - Registry Types
//!
//! Data structures shared by every Verity crate: diploma records and their
//! field dictionary, audit/search log entries, identifier rules, the clock
//! abstraction and the error hierarchy. No I/O lives here.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub mod audit;
pub mod clock;
pub mod diploma;
pub mod error;
pub mod identifier;
pub mod query;

pub use audit::{AdminAction, AdminActionLogEntry, AdminUser, SearchLogEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use diploma::{
    DiplomaField, DiplomaFields, DiplomaInput, DiplomaRecord, PublicDiploma, CREATE_REQUIRED,
    DEFAULT_DIPLOMA_TYPE, DEFAULT_NATIONALITY, IMPORT_REQUIRED,
};
pub use error::{
    ConfigError, StorageError, ValidationError, VerificationError, VerityError, VerityResult,
};
pub use identifier::{
    has_sequence_tail, DiplomaTypeCode, IdentifierPrefix, DEFAULT_ORG_PREFIX, MAX_SEQUENCE,
};
pub use query::{
    ComboQuery, DiplomaListFilter, DiplomaLookup, DiplomaPage, SearchSummary, TopSearched,
};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// SHA-256 of a document number, hex encoded.
///
/// Search logs keep this next to the plaintext so aggregate views can group
/// lookups without reading the number itself.
pub fn compute_document_hash(document_number: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_number.trim().as_bytes());
    hex::encode(hasher.finalize())
}
