//! Audit trail entity models and DTOs.
//!
//! The trail is append-only; entries have no `updated_at` and no update DTO.

use civica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A single audit trail entry. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditLog {
    pub id: DbId,
    pub entity: String,
    pub entity_id: Option<DbId>,
    pub action: String,
    pub performed_by: Option<DbId>,
    pub details_json: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for inserting a new audit trail entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuditLog {
    pub entity: String,
    pub entity_id: Option<DbId>,
    pub action: String,
    pub performed_by: Option<DbId>,
    pub details_json: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}
