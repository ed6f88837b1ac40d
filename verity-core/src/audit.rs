//! Append-only log entries and the admin account type.

use serde::{Deserialize, Serialize};

use crate::{EntityId, Timestamp};

/// One public lookup attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SearchLogEntry {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    /// Plaintext number; `None` for combo lookups that found nothing.
    pub document_number: Option<String>,
    /// SHA-256 hex of `document_number`.
    pub document_hash: Option<String>,
    pub client_address: String,
    pub user_agent: Option<String>,
    pub found: bool,
    pub latency_ms: i64,
    pub verification_score: Option<f64>,
    pub verification_status: Option<String>,
    pub error: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

impl SearchLogEntry {
    pub fn new(client_address: impl Into<String>, created_at: Timestamp) -> Self {
        Self {
            id: crate::new_entity_id(),
            document_number: None,
            document_hash: None,
            client_address: client_address.into(),
            user_agent: None,
            found: false,
            latency_ms: 0,
            verification_score: None,
            verification_status: None,
            error: None,
            created_at,
        }
    }

    /// Attach the number and its hash.
    pub fn with_document_number(mut self, document_number: Option<&str>) -> Self {
        self.document_hash = document_number.map(crate::compute_document_hash);
        self.document_number = document_number.map(str::to_string);
        self
    }
}

/// Kind of administrative mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AdminAction {
    Create,
    Update,
    Delete,
    Import,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::Create => "create",
            AdminAction::Update => "update",
            AdminAction::Delete => "delete",
            AdminAction::Import => "import",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(AdminAction::Create),
            "update" => Some(AdminAction::Update),
            "delete" => Some(AdminAction::Delete),
            "import" => Some(AdminAction::Import),
            _ => None,
        }
    }
}

impl std::fmt::Display for AdminAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One administrative mutation with before/after snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AdminActionLogEntry {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "uuid"))]
    pub id: EntityId,
    pub admin_username: String,
    pub action: AdminAction,
    pub table_name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<String>, format = "uuid"))]
    pub record_id: Option<EntityId>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub before: Option<serde_json::Value>,
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub after: Option<serde_json::Value>,
    pub description: String,
    pub client_address: String,
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = "date-time"))]
    pub created_at: Timestamp,
}

/// Administrator account.
///
/// `password_hash` is an argon2 PHC string and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminUser {
    pub id: EntityId,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub is_active: bool,
    pub last_login_at: Option<Timestamp>,
    pub created_at: Timestamp,
}
