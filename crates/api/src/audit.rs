//! Fire-and-forget audit recording.
//!
//! Every state-changing operation and every authorization denial produces an
//! entry. Recording failures are logged and never fail the request: the
//! trail is mandatory to attempt, not a transactional dependency.

use civica_core::access::DenialReason;
use civica_core::audit::actions;
use civica_core::types::DbId;
use civica_db::models::audit::CreateAuditLog;
use civica_db::repositories::AuditRepo;
use civica_db::DbPool;

use crate::middleware::request_info::RequestInfo;

/// Build an audit entry carrying the request metadata.
pub fn entry(
    entity: &str,
    entity_id: Option<DbId>,
    action: &str,
    performed_by: Option<DbId>,
    info: &RequestInfo,
    details: Option<serde_json::Value>,
) -> CreateAuditLog {
    CreateAuditLog {
        entity: entity.to_string(),
        entity_id,
        action: action.to_string(),
        performed_by,
        details_json: details,
        ip_address: info.ip_address.clone(),
        user_agent: info.user_agent.clone(),
        request_id: info.request_id.clone(),
    }
}

/// Persist an audit entry, logging instead of propagating failures.
pub async fn record(pool: &DbPool, input: CreateAuditLog) {
    if let Err(err) = AuditRepo::create(pool, &input).await {
        tracing::warn!(
            action = %input.action,
            entity = %input.entity,
            error = %err,
            "Failed to record audit entry"
        );
    }
}

/// Record an access-gate denial with its reason. Called before every
/// rejection is returned.
pub async fn record_denial(
    pool: &DbPool,
    entity: &str,
    entity_id: Option<DbId>,
    reason: DenialReason,
    performed_by: Option<DbId>,
    info: &RequestInfo,
) {
    let details = serde_json::json!({ "reason": reason.as_str() });
    record(
        pool,
        entry(
            entity,
            entity_id,
            actions::ACCESS_DENIED,
            performed_by,
            info,
            Some(details),
        ),
    )
    .await;
}
