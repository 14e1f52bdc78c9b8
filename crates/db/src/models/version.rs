//! Version ledger entity models.
//!
//! Ledger entries are append-only: no update DTO exists on purpose, and the
//! repository exposes no update or delete.

use civica_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// An immutable snapshot of a diagnostic at one point in time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Version {
    pub id: DbId,
    pub diagnostic_id: DbId,
    /// Strictly increasing per diagnostic: 1, 2, 3, no gaps, no reuse.
    pub version_number: i32,
    pub author_role: String,
    /// Milestone label, when this entry was recorded as one.
    pub label: Option<String>,
    /// Versioned-envelope JSON; see `civica_core::snapshot`.
    pub snapshot: serde_json::Value,
    pub created_at: Timestamp,
}

/// A ledger entry flagged as an unresolved conflict, for the poll payload.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedConflict {
    pub diagnostic_id: DbId,
    pub version_number: i32,
    pub fields: Vec<String>,
    pub base_version_number: i32,
    pub server_version_number: i32,
    pub created_at: Timestamp,
}
