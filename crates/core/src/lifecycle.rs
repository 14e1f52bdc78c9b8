//! Session and diagnostic lifecycle rules.
//!
//! The state machines are small and all transitions are validated here so
//! handlers and repositories share one source of truth. Expiry is lazy:
//! nothing sweeps sessions in the background; every reader resolves the
//! effective status through [`resolve_effective_status`].

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::Timestamp;

/// Wall-clock hour at which a session without an explicit expiry closes.
pub const DEFAULT_CLOSE_HOUR: u32 = 18;

// ---------------------------------------------------------------------------
// Session status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Preparation,
    Active,
    Closed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Preparation => "PREPARATION",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Closed => "CLOSED",
            SessionStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PREPARATION" => Ok(SessionStatus::Preparation),
            "ACTIVE" => Ok(SessionStatus::Active),
            "CLOSED" => Ok(SessionStatus::Closed),
            "CANCELLED" => Ok(SessionStatus::Cancelled),
            other => Err(CoreError::Validation(format!(
                "Unknown session status: {other}"
            ))),
        }
    }
}

/// Legal forward transitions of the session state machine.
///
/// ```text
/// PREPARATION -> ACTIVE | CANCELLED
/// ACTIVE      -> CLOSED | CANCELLED
/// ```
pub fn can_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    matches!(
        (from, to),
        (Preparation, Active) | (Preparation, Cancelled) | (Active, Closed) | (Active, Cancelled)
    )
}

/// Whether participants may enter a session in this stored status.
pub fn can_join(status: SessionStatus) -> bool {
    matches!(status, SessionStatus::Preparation | SessionStatus::Active)
}

/// Resolve the status readers must act on.
///
/// A session whose expiry has passed counts as CLOSED even while the stored
/// row still says PREPARATION or ACTIVE; the stored row is flipped lazily
/// and best-effort by read paths. Terminal stored statuses are never
/// overridden. Pure and idempotent: same inputs, same answer.
pub fn resolve_effective_status(
    stored: SessionStatus,
    expires_at: Option<Timestamp>,
    now: Timestamp,
) -> SessionStatus {
    let expired = expires_at.is_some_and(|deadline| now >= deadline);
    match stored {
        SessionStatus::Preparation | SessionStatus::Active if expired => SessionStatus::Closed,
        _ => stored,
    }
}

/// Default expiry for a session created without one: today at
/// [`DEFAULT_CLOSE_HOUR`] local wall-clock, or the same hour tomorrow when
/// that moment has already passed.
pub fn default_expiry(now: NaiveDateTime) -> NaiveDateTime {
    let closing = now
        .date()
        .and_hms_opt(DEFAULT_CLOSE_HOUR, 0, 0)
        .expect("18:00:00 is a valid wall-clock time");
    if closing <= now {
        closing + Duration::days(1)
    } else {
        closing
    }
}

// ---------------------------------------------------------------------------
// Diagnostic status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticStatus {
    Draft,
    Submitted,
    InReview,
    Finalized,
}

impl DiagnosticStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticStatus::Draft => "DRAFT",
            DiagnosticStatus::Submitted => "SUBMITTED",
            DiagnosticStatus::InReview => "IN_REVIEW",
            DiagnosticStatus::Finalized => "FINALIZED",
        }
    }

    /// FINALIZED is terminal; nothing moves out of it.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DiagnosticStatus::Finalized)
    }
}

impl fmt::Display for DiagnosticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DiagnosticStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(DiagnosticStatus::Draft),
            "SUBMITTED" => Ok(DiagnosticStatus::Submitted),
            "IN_REVIEW" => Ok(DiagnosticStatus::InReview),
            "FINALIZED" => Ok(DiagnosticStatus::Finalized),
            other => Err(CoreError::Validation(format!(
                "Unknown diagnostic status: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Version authorship
// ---------------------------------------------------------------------------

/// Who authored a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorRole {
    Participant,
    Reviewer,
}

impl AuthorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthorRole::Participant => "PARTICIPANT",
            AuthorRole::Reviewer => "REVIEWER",
        }
    }
}

impl fmt::Display for AuthorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthorRole {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PARTICIPANT" => Ok(AuthorRole::Participant),
            "REVIEWER" => Ok(AuthorRole::Reviewer),
            other => Err(CoreError::Validation(format!(
                "Unknown author role: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
