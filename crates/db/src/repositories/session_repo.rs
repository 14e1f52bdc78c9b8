//! Repository for the `sessions` table.
//!
//! Session creation owns the join-code collision retry loop and the
//! one-active-session-per-municipality pre-check; the partial unique index
//! `uq_sessions_active_municipality` backstops the pre-check against races.

use chrono::{Local, TimeZone, Utc};
use civica_core::classroom::{self, CODE_COLLISION_ATTEMPTS};
use civica_core::error::CoreError;
use civica_core::lifecycle::{self, SessionStatus};
use civica_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::error::{RepoError, RepoResult};
use crate::models::session::{CreateSession, CreatedSession, Session, SessionWithCounts};
use crate::repositories::municipality_repo::MunicipalityRepo;

const COLUMNS: &str = "id, code, token_hash, title, description, status, facilitator_id, \
    municipality_id, client_id, project_id, hub, cycle_start_year, cycle_end_year, \
    expires_at, created_at, updated_at";

pub const CONSTRAINT_CODE: &str = "uq_sessions_code";
pub const CONSTRAINT_ACTIVE_MUNICIPALITY: &str = "uq_sessions_active_municipality";

pub struct SessionRepo;

impl SessionRepo {
    // ── Creation ─────────────────────────────────────────────────────

    /// Open a new session for a municipality.
    ///
    /// Fails with a conflict before any session write when the municipality
    /// already has an effectively-ACTIVE session. Join-code collisions are
    /// absorbed by a bounded insert-retry loop; the plaintext token is
    /// returned once and only its hash stored.
    pub async fn create(
        pool: &PgPool,
        facilitator_id: DbId,
        input: &CreateSession,
    ) -> RepoResult<CreatedSession> {
        let municipality = MunicipalityRepo::find_by_id(pool, &input.municipality_id)
            .await?
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unknown municipality: {}",
                    input.municipality_id
                ))
            })?;

        // A session whose expiry has passed is effectively CLOSED; flip it
        // first so it cannot block the new one.
        Self::close_expired_for_municipality(pool, &input.municipality_id).await?;

        if Self::find_active_by_municipality(pool, &input.municipality_id)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict("MUNICIPALITY_ALREADY_ACTIVE".into()).into());
        }

        let title = input
            .title
            .clone()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| municipality.display_name());
        let expires_at = match input.expires_at {
            Some(ts) => Some(ts),
            None => default_expiry_utc(),
        };
        let status = if input.start_in_preparation {
            SessionStatus::Preparation
        } else {
            SessionStatus::Active
        };
        let token = classroom::issue_token();

        let query = format!(
            "INSERT INTO sessions
                (code, token_hash, title, description, status, facilitator_id,
                 municipality_id, client_id, project_id, hub,
                 cycle_start_year, cycle_end_year, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING {COLUMNS}"
        );
        for _ in 0..CODE_COLLISION_ATTEMPTS {
            let code = classroom::generate_join_code();
            let result = sqlx::query_as::<_, Session>(&query)
                .bind(&code)
                .bind(&token.hash)
                .bind(&title)
                .bind(&input.description)
                .bind(status.as_str())
                .bind(facilitator_id)
                .bind(&input.municipality_id)
                .bind(input.client_id)
                .bind(input.project_id)
                .bind(&input.hub)
                .bind(input.cycle_start_year)
                .bind(input.cycle_end_year)
                .bind(expires_at)
                .fetch_one(pool)
                .await;
            match result {
                Ok(session) => {
                    return Ok(CreatedSession {
                        session,
                        join_token: token.plaintext,
                    })
                }
                Err(sqlx::Error::Database(db_err))
                    if db_err.constraint() == Some(CONSTRAINT_CODE) =>
                {
                    tracing::debug!(code = %code, "Join code collision, retrying");
                    continue;
                }
                Err(sqlx::Error::Database(db_err))
                    if db_err.constraint() == Some(CONSTRAINT_ACTIVE_MUNICIPALITY) =>
                {
                    return Err(
                        CoreError::Conflict("MUNICIPALITY_ALREADY_ACTIVE".into()).into()
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(CoreError::Internal("Join code generation attempts exhausted".into()).into())
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE id = $1");
        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<Session>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM sessions WHERE code = upper($1)");
        sqlx::query_as::<_, Session>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    /// The municipality's stored-ACTIVE session, if any.
    pub async fn find_active_by_municipality(
        pool: &PgPool,
        municipality_id: &str,
    ) -> Result<Option<Session>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE municipality_id = $1 AND status = 'ACTIVE'"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(municipality_id)
            .fetch_optional(pool)
            .await
    }

    /// List sessions with participant counts, newest first. Optionally
    /// scoped to one facilitator and/or one stored status.
    pub async fn list(
        pool: &PgPool,
        facilitator_id: Option<DbId>,
        status: Option<SessionStatus>,
    ) -> Result<Vec<SessionWithCounts>, sqlx::Error> {
        let query = format!(
            "SELECT s.*, COALESCE(p.cnt, 0) AS participant_count,
                    COALESCE(d.cnt, 0) AS diagnostic_count
             FROM (SELECT {COLUMNS} FROM sessions) s
             LEFT JOIN (
                 SELECT session_id, COUNT(*) AS cnt FROM participants GROUP BY session_id
             ) p ON p.session_id = s.id
             LEFT JOIN (
                 SELECT classroom_session_id, COUNT(*) AS cnt FROM diagnostics
                 WHERE classroom_session_id IS NOT NULL
                 GROUP BY classroom_session_id
             ) d ON d.classroom_session_id = s.id
             WHERE ($1::bigint IS NULL OR s.facilitator_id = $1)
               AND ($2::text IS NULL OR s.status = $2)
             ORDER BY s.created_at DESC"
        );
        sqlx::query_as::<_, SessionWithCounts>(&query)
            .bind(facilitator_id)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(pool)
            .await
    }

    // ── Lifecycle writes ─────────────────────────────────────────────

    /// Persist a status change. Transition legality is validated by the
    /// caller. Activation mirrors create: expired rivals for the same
    /// municipality are closed first, and the partial unique index rejects a
    /// genuinely live rival as `MUNICIPALITY_ALREADY_ACTIVE`.
    pub async fn update_status(
        pool: &PgPool,
        id: DbId,
        status: SessionStatus,
    ) -> RepoResult<Option<Session>> {
        if status == SessionStatus::Active {
            sqlx::query(
                "UPDATE sessions SET status = 'CLOSED', updated_at = NOW()
                 WHERE municipality_id =
                       (SELECT municipality_id FROM sessions WHERE id = $1)
                   AND id <> $1 AND status IN ('PREPARATION', 'ACTIVE')
                   AND expires_at IS NOT NULL AND expires_at <= NOW()",
            )
            .bind(id)
            .execute(pool)
            .await?;
        }

        let query = format!(
            "UPDATE sessions SET status = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let result = sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(pool)
            .await;
        match result {
            Ok(session) => Ok(session),
            Err(sqlx::Error::Database(db_err))
                if db_err.constraint() == Some(CONSTRAINT_ACTIVE_MUNICIPALITY) =>
            {
                Err(CoreError::Conflict("MUNICIPALITY_ALREADY_ACTIVE".into()).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Replace the expiry. `None` disables auto-expiry.
    pub async fn set_expiry(
        pool: &PgPool,
        id: DbId,
        expires_at: Option<Timestamp>,
    ) -> Result<Option<Session>, sqlx::Error> {
        let query = format!(
            "UPDATE sessions SET expires_at = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Session>(&query)
            .bind(id)
            .bind(expires_at)
            .fetch_optional(pool)
            .await
    }

    /// Lazily flip one expired non-terminal session to CLOSED. Best-effort:
    /// readers already resolve the effective status without this write.
    pub async fn close_if_expired(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions SET status = 'CLOSED', updated_at = NOW()
             WHERE id = $1 AND status IN ('PREPARATION', 'ACTIVE')
               AND expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn close_expired_for_municipality(
        pool: &PgPool,
        municipality_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE sessions SET status = 'CLOSED', updated_at = NOW()
             WHERE municipality_id = $1 AND status IN ('PREPARATION', 'ACTIVE')
               AND expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .bind(municipality_id)
        .execute(pool)
        .await?;
        Ok(())
    }
}

/// Default expiry in UTC, computed from local wall-clock (today 18:00, or
/// tomorrow when already past). Falls back across DST gaps.
fn default_expiry_utc() -> Option<Timestamp> {
    let naive = lifecycle::default_expiry(Local::now().naive_local());
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

impl Session {
    /// Parse the stored status column.
    pub fn parsed_status(&self) -> Result<SessionStatus, RepoError> {
        Ok(self.status.parse::<SessionStatus>()?)
    }

    /// The status readers must act on, accounting for lazy expiry.
    pub fn effective_status(&self, now: Timestamp) -> Result<SessionStatus, RepoError> {
        Ok(lifecycle::resolve_effective_status(
            self.parsed_status()?,
            self.expires_at,
            now,
        ))
    }
}
