//! Ledger snapshot envelope.
//!
//! Ledger entries store the whole questionnaire state as structured JSON
//! rather than a fixed typed record, because the questionnaire schema
//! evolves. Every snapshot carries a `schemaVersion` tag so future readers
//! can tell shapes apart without guessing, plus optional `conflict` and
//! `conflictResolution` blocks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{DbId, Timestamp};

/// Current snapshot envelope shape.
pub const SCHEMA_VERSION: i64 = 1;

pub const KEY_SCHEMA_VERSION: &str = "schemaVersion";
pub const KEY_CONFLICT: &str = "conflict";
pub const KEY_CONFLICT_RESOLUTION: &str = "conflictResolution";

/// Envelope keys that are bookkeeping, not answer content. Excluded from
/// conflict field diffs.
const META_KEYS: &[&str] = &[KEY_SCHEMA_VERSION, KEY_CONFLICT, KEY_CONFLICT_RESOLUTION];

/// Evidence of concurrent-write divergence, embedded in the snapshot of the
/// entry that lost the race. The write is never rejected; this block is the
/// visible trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictBlock {
    pub detected: bool,
    /// Top-level answer groups that differ between the writer's payload and
    /// the entry it claimed as its base.
    pub fields: Vec<String>,
    pub base_version_number: i32,
    /// Latest ledger version at the moment the conflicting write arrived,
    /// before its own append.
    pub server_version_number: i32,
}

/// A resolution event: an appended fact, never a mutation of the flagged
/// entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    pub resolved_from_version_number: i32,
    pub resolved_by: DbId,
    pub resolved_at: Timestamp,
}

/// Wrap an answer-content object into a versioned envelope.
pub fn envelope(mut body: Map<String, Value>) -> Value {
    body.insert(KEY_SCHEMA_VERSION.into(), Value::from(SCHEMA_VERSION));
    Value::Object(body)
}

/// Names of the top-level answer groups that differ between two snapshots.
/// Bookkeeping keys are ignored; a group missing on one side counts as
/// different. Output is sorted for stable display.
pub fn diff_answer_groups(incoming: &Value, base: &Value) -> Vec<String> {
    let empty = Map::new();
    let incoming = incoming.as_object().unwrap_or(&empty);
    let base = base.as_object().unwrap_or(&empty);

    let mut fields: Vec<String> = incoming
        .keys()
        .chain(base.keys())
        .filter(|k| !META_KEYS.contains(&k.as_str()))
        .filter(|k| incoming.get(k.as_str()) != base.get(k.as_str()))
        .cloned()
        .collect();
    fields.sort();
    fields.dedup();
    fields
}

/// Annotate a snapshot with conflict evidence before it is appended.
pub fn attach_conflict(snapshot: &mut Value, block: &ConflictBlock) {
    if let Some(map) = snapshot.as_object_mut() {
        if let Ok(value) = serde_json::to_value(block) {
            map.insert(KEY_CONFLICT.into(), value);
        }
    }
}

/// Annotate a snapshot with a resolution block before it is appended.
pub fn attach_resolution(snapshot: &mut Value, resolution: &ConflictResolution) {
    if let Some(map) = snapshot.as_object_mut() {
        if let Ok(value) = serde_json::to_value(resolution) {
            map.insert(KEY_CONFLICT_RESOLUTION.into(), value);
        }
    }
}

/// Read the conflict block out of a stored snapshot, if any.
pub fn conflict_of(snapshot: &Value) -> Option<ConflictBlock> {
    snapshot
        .get(KEY_CONFLICT)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Read the resolution block out of a stored snapshot, if any.
pub fn resolution_of(snapshot: &Value) -> Option<ConflictResolution> {
    snapshot
        .get(KEY_CONFLICT_RESOLUTION)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}
