//! Repository for the append-only `audit_log` table.

use civica_core::audit::redact_sensitive_fields;
use civica_core::types::DbId;
use sqlx::PgPool;

use crate::models::audit::{AuditLog, CreateAuditLog};

const COLUMNS: &str = "id, entity, entity_id, action, performed_by, details_json, \
    ip_address, user_agent, request_id, created_at";

pub struct AuditRepo;

impl AuditRepo {
    /// Insert a new audit trail entry. Detail payloads are redacted before
    /// storage so secrets never reach the trail.
    pub async fn create(pool: &PgPool, input: &CreateAuditLog) -> Result<AuditLog, sqlx::Error> {
        let details = input.details_json.as_ref().map(redact_sensitive_fields);
        let query = format!(
            "INSERT INTO audit_log
                (entity, entity_id, action, performed_by, details_json,
                 ip_address, user_agent, request_id)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(&input.entity)
            .bind(input.entity_id)
            .bind(&input.action)
            .bind(input.performed_by)
            .bind(details)
            .bind(&input.ip_address)
            .bind(&input.user_agent)
            .bind(&input.request_id)
            .fetch_one(pool)
            .await
    }

    /// List entries for one entity, newest first.
    pub async fn list_for_entity(
        pool: &PgPool,
        entity: &str,
        entity_id: DbId,
    ) -> Result<Vec<AuditLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_log
             WHERE entity = $1 AND entity_id = $2
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, AuditLog>(&query)
            .bind(entity)
            .bind(entity_id)
            .fetch_all(pool)
            .await
    }
}
