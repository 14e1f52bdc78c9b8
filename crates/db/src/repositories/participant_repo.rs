//! Repository for the `participants` table.

use civica_core::types::DbId;
use sqlx::PgPool;

use crate::models::participant::{CreateParticipant, Participant};

const COLUMNS: &str = "id, session_id, name, email, phone, joined_at";

pub struct ParticipantRepo;

impl ParticipantRepo {
    /// Record a join. Re-joining with an email already present in the same
    /// session returns the existing record instead of duplicating it.
    pub async fn create(
        pool: &PgPool,
        session_id: DbId,
        input: &CreateParticipant,
    ) -> Result<Participant, sqlx::Error> {
        if let Some(email) = input.email.as_deref().filter(|e| !e.trim().is_empty()) {
            let query = format!(
                "SELECT {COLUMNS} FROM participants
                 WHERE session_id = $1 AND lower(email) = lower($2)"
            );
            if let Some(existing) = sqlx::query_as::<_, Participant>(&query)
                .bind(session_id)
                .bind(email)
                .fetch_optional(pool)
                .await?
            {
                return Ok(existing);
            }
        }
        let query = format!(
            "INSERT INTO participants (session_id, name, email, phone)
             VALUES ($1, $2, $3, $4)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Participant>(&query)
            .bind(session_id)
            .bind(&input.name)
            .bind(&input.email)
            .bind(&input.phone)
            .fetch_one(pool)
            .await
    }

    /// List a session's participants in join order.
    pub async fn list_by_session(
        pool: &PgPool,
        session_id: DbId,
    ) -> Result<Vec<Participant>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM participants WHERE session_id = $1 ORDER BY joined_at"
        );
        sqlx::query_as::<_, Participant>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    pub async fn count_by_session(pool: &PgPool, session_id: DbId) -> Result<i64, sqlx::Error> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM participants WHERE session_id = $1")
                .bind(session_id)
                .fetch_one(pool)
                .await?;
        Ok(row.0)
    }
}
