//! Diagnostic session entity models and DTOs.

use civica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Session entity
// ---------------------------------------------------------------------------

/// One time-boxed collection window for exactly one municipality.
///
/// `token_hash` never leaves the persistence layer; the plaintext token is
/// returned to the facilitator once at creation and never again.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Session {
    pub id: DbId,
    pub code: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub facilitator_id: DbId,
    pub municipality_id: String,
    pub client_id: Option<DbId>,
    pub project_id: Option<DbId>,
    pub hub: Option<String>,
    pub cycle_start_year: Option<i32>,
    pub cycle_end_year: Option<i32>,
    pub expires_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for opening a new session. Code, token and default title/expiry are
/// computed by the repository, not supplied by the caller.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSession {
    pub municipality_id: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub client_id: Option<DbId>,
    pub project_id: Option<DbId>,
    pub hub: Option<String>,
    pub cycle_start_year: Option<i32>,
    pub cycle_end_year: Option<i32>,
    pub expires_at: Option<Timestamp>,
    /// Open in PREPARATION instead of going ACTIVE immediately.
    #[serde(default)]
    pub start_in_preparation: bool,
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// A freshly created session plus the one-time plaintext join token.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    #[serde(flatten)]
    pub session: Session,
    /// Shown exactly once; only the hash is stored.
    pub join_token: String,
}

/// Session row plus aggregate counts, for facilitator listings.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SessionWithCounts {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub session: Session,
    pub participant_count: i64,
    pub diagnostic_count: i64,
}
