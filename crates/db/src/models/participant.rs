//! Participant join records.

use civica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One person who entered a session. Purely descriptive; participants carry
/// no authentication identity.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Participant {
    pub id: DbId,
    pub session_id: DbId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub joined_at: Timestamp,
}

/// DTO for a join request.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateParticipant {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}
