//! Diagnostic record entity models and DTOs.
//!
//! The diagnostic is the mutable "current" projection of one questionnaire
//! instance; its history lives in the version ledger. Section answers and
//! consultant reviews are joined rows, open-ended answers a keyed set.

use civica_core::snapshot::ConflictBlock;
use civica_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Diagnostic entity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Diagnostic {
    pub id: DbId,
    pub status: String,
    pub municipality_id: String,
    pub respondent_name: Option<String>,
    pub respondent_email: Option<String>,
    pub respondent_role: Option<String>,
    pub consent: bool,
    /// Session this record originated from. Once set, all writes arriving
    /// with that session's identity target this record.
    pub classroom_session_id: Option<DbId>,
    pub reviewer_id: Option<DbId>,
    pub respondent_user_id: Option<DbId>,
    pub term_id: Option<DbId>,
    /// Per-diagnostic monotonic version counter; incremented atomically in
    /// the same transaction as every ledger append.
    pub latest_version: i32,
    pub submitted_at: Option<Timestamp>,
    pub finalized_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One dimension's answers within one section, as written by participants.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SectionAnswer {
    pub id: DbId,
    pub diagnostic_id: DbId,
    pub section_code: String,
    /// `positive`, `negative` or `solution`.
    pub dimension: String,
    pub topics: Json<Vec<String>>,
    pub elaboration: Option<String>,
    /// Respondent-facing score, computed at write time.
    pub score: i32,
}

/// One dimension's consultant analysis within one section.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SectionReview {
    pub id: DbId,
    pub diagnostic_id: DbId,
    pub section_code: String,
    pub dimension: String,
    pub analysis: Option<String>,
    /// Reviewer-facing score; unset until the reviewer has written analysis,
    /// so "not yet reviewed" stays distinguishable from "reviewed as zero".
    pub reviewer_score: Option<i32>,
}

/// One keyed open-ended answer.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OpenAnswer {
    pub id: DbId,
    pub diagnostic_id: DbId,
    pub question_key: String,
    pub answer: String,
}

// ---------------------------------------------------------------------------
// Write DTOs
// ---------------------------------------------------------------------------

/// The valid dimension names, in display order.
pub const DIMENSIONS: &[&str] = &["positive", "negative", "solution"];

#[derive(Debug, Clone, Deserialize)]
pub struct SectionAnswerInput {
    pub section_code: String,
    pub dimension: String,
    #[serde(default)]
    pub topics: Vec<String>,
    pub elaboration: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionReviewInput {
    pub section_code: String,
    pub dimension: String,
    pub analysis: Option<String>,
}

/// DTO for the shared save path. Autosave and milestone creation are the
/// same code path; `create_version` is the only difference.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaveDiagnostic {
    /// Explicit target record; when absent the record is located (or
    /// created) through the classroom session.
    pub diagnostic_id: Option<DbId>,
    pub municipality_id: Option<String>,
    pub respondent_name: Option<String>,
    pub respondent_email: Option<String>,
    pub respondent_role: Option<String>,
    pub consent: Option<bool>,
    pub term_id: Option<DbId>,
    #[serde(default)]
    pub sections: Vec<SectionAnswerInput>,
    #[serde(default)]
    pub open_answers: BTreeMap<String, String>,
    #[serde(default)]
    pub create_version: bool,
    /// Ledger version the writer believes they are building on; triggers
    /// conflict detection when behind the latest.
    pub base_version_number: Option<i32>,
}

/// DTO for the wholesale consultant-analysis replacement.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewUpdate {
    pub reviews: Vec<SectionReviewInput>,
}

/// DTO for recording a labelled milestone snapshot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordMilestone {
    pub label: Option<String>,
}

// ---------------------------------------------------------------------------
// Operation results
// ---------------------------------------------------------------------------

/// Result of any diagnostic write.
#[derive(Debug, Clone, Serialize)]
pub struct SaveOutcome {
    pub diagnostic_id: DbId,
    /// Latest ledger version after the write.
    pub version_number: i32,
    pub version_created: bool,
    /// Conflict evidence, exactly as embedded in the appended snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<ConflictBlock>,
}

/// The diagnostic with all its joined rows, for detail reads and snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticDetails {
    #[serde(flatten)]
    pub diagnostic: Diagnostic,
    pub sections: Vec<SectionAnswer>,
    pub reviews: Vec<SectionReview>,
    pub open_answers: Vec<OpenAnswer>,
}
