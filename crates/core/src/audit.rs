//! Audit trail constants and utility functions.
//!
//! This module lives in `core` (zero internal deps) so it can be used by both
//! the API/repository layer and any future worker or CLI tooling. Every
//! authorization denial and every state-changing operation produces an audit
//! record with one of these actions.

// ---------------------------------------------------------------------------
// Action constants
// ---------------------------------------------------------------------------

/// Known actions for audit trail entries.
pub mod actions {
    pub const SESSION_CREATE: &str = "session_create";
    pub const SESSION_TRANSITION: &str = "session_transition";
    pub const SESSION_SET_EXPIRY: &str = "session_set_expiry";
    pub const SESSION_JOIN_SUCCESS: &str = "session_join_success";
    pub const SESSION_JOIN_FAILED: &str = "session_join_failed";
    pub const DIAGNOSTIC_SAVE: &str = "diagnostic_save";
    pub const DIAGNOSTIC_SUBMIT: &str = "diagnostic_submit";
    pub const DIAGNOSTIC_REVIEW: &str = "diagnostic_review";
    pub const DIAGNOSTIC_FINALIZE: &str = "diagnostic_finalize";
    pub const DIAGNOSTIC_MILESTONE: &str = "diagnostic_milestone";
    pub const CONFLICT_RESOLVE: &str = "conflict_resolve";
    pub const ACCESS_DENIED: &str = "access_denied";
}

/// Known entity names for audit trail entries.
pub mod entities {
    pub const SESSION: &str = "session";
    pub const DIAGNOSTIC: &str = "diagnostic";
    pub const VERSION: &str = "version";
}

/// Detail-payload reasons attached to specific actions.
pub mod reasons {
    /// Submission accepted against an expired session (expiry forces
    /// submission, it never blocks it).
    pub const CLASSROOM_EXPIRED_FORCED_SUBMIT: &str = "CLASSROOM_EXPIRED_FORCED_SUBMIT";
}

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// Fields that must be redacted from audit detail payloads before storage.
/// Join tokens in particular are shown to the facilitator exactly once and
/// must never reach the audit trail in plaintext.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "authorization",
    "credential",
    "join_token",
    "api_key",
];

/// Redact sensitive fields from a JSON value, recursing through objects and
/// arrays. Replaces the value of any key matching [`SENSITIVE_FIELDS`] with
/// `"[REDACTED]"` and returns a new value.
pub fn redact_sensitive_fields(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let lower_key = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|f| lower_key.contains(f)) {
                    redacted.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    redacted.insert(key.clone(), redact_sensitive_fields(val));
                }
            }
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(redact_sensitive_fields).collect())
        }
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
