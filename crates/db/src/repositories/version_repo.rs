//! Repository for the append-only `versions` ledger.
//!
//! Version numbers come from an explicit per-diagnostic counter on the
//! parent row, bumped with an atomic increment-and-fetch. The bump takes the
//! parent's row lock, so two concurrent appenders serialize and can never
//! compute the same number. [`VersionRepo::append`] therefore only accepts a
//! transaction connection, never a bare pool.

use civica_core::lifecycle::AuthorRole;
use civica_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::version::Version;

const COLUMNS: &str = "id, diagnostic_id, version_number, author_role, label, snapshot, created_at";

pub struct VersionRepo;

impl VersionRepo {
    /// Append a snapshot inside the caller's transaction, which must also
    /// hold the write lock on the parent diagnostic.
    pub async fn append(
        conn: &mut PgConnection,
        diagnostic_id: DbId,
        author_role: AuthorRole,
        label: Option<&str>,
        snapshot: &serde_json::Value,
    ) -> Result<Version, sqlx::Error> {
        let (next_version,): (i32,) = sqlx::query_as(
            "UPDATE diagnostics SET latest_version = latest_version + 1, updated_at = NOW()
             WHERE id = $1
             RETURNING latest_version",
        )
        .bind(diagnostic_id)
        .fetch_one(&mut *conn)
        .await?;

        let query = format!(
            "INSERT INTO versions (diagnostic_id, version_number, author_role, label, snapshot)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Version>(&query)
            .bind(diagnostic_id)
            .bind(next_version)
            .bind(author_role.as_str())
            .bind(label)
            .bind(snapshot)
            .fetch_one(&mut *conn)
            .await
    }

    /// List a diagnostic's ledger, version number ascending.
    pub async fn list(pool: &PgPool, diagnostic_id: DbId) -> Result<Vec<Version>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM versions
             WHERE diagnostic_id = $1
             ORDER BY version_number ASC"
        );
        sqlx::query_as::<_, Version>(&query)
            .bind(diagnostic_id)
            .fetch_all(pool)
            .await
    }

    /// Current ledger length for a diagnostic.
    pub async fn latest_version_number(
        pool: &PgPool,
        diagnostic_id: DbId,
    ) -> Result<i32, sqlx::Error> {
        let row: (i32,) =
            sqlx::query_as("SELECT latest_version FROM diagnostics WHERE id = $1")
                .bind(diagnostic_id)
                .fetch_one(pool)
                .await?;
        Ok(row.0)
    }

    /// Fetch one ledger entry by number, inside a transaction.
    pub async fn find_by_number(
        conn: &mut PgConnection,
        diagnostic_id: DbId,
        version_number: i32,
    ) -> Result<Option<Version>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM versions
             WHERE diagnostic_id = $1 AND version_number = $2"
        );
        sqlx::query_as::<_, Version>(&query)
            .bind(diagnostic_id)
            .bind(version_number)
            .fetch_optional(&mut *conn)
            .await
    }

    /// All ledger entries across a session's diagnostics, version ascending.
    /// Feeds the unresolved-conflict scan.
    pub async fn list_for_session(
        pool: &PgPool,
        session_id: DbId,
    ) -> Result<Vec<Version>, sqlx::Error> {
        let query = format!(
            "SELECT v.id, v.diagnostic_id, v.version_number, v.author_role, v.label,
                    v.snapshot, v.created_at
             FROM versions v
             JOIN diagnostics d ON d.id = v.diagnostic_id
             WHERE d.classroom_session_id = $1
             ORDER BY v.diagnostic_id, v.version_number ASC"
        );
        sqlx::query_as::<_, Version>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }
}
