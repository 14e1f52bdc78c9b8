//! Repository for diagnostic records and their write transactions.
//!
//! Every write here follows the same shape: lock the parent row FOR UPDATE,
//! mutate the current projection, rebuild the full snapshot, and append to
//! the ledger through [`VersionRepo::append`] before committing. Conflict
//! detection and scoring happen inside the same transaction so concurrent
//! writers serialize on the diagnostic row.

use chrono::Utc;
use civica_core::error::CoreError;
use civica_core::lifecycle::{AuthorRole, DiagnosticStatus};
use civica_core::scoring::{self, DimensionInput};
use civica_core::snapshot::{self, ConflictBlock, ConflictResolution};
use civica_core::types::DbId;
use serde_json::{Map, Value};
use sqlx::{PgConnection, PgPool};

use crate::error::{RepoError, RepoResult};
use crate::models::diagnostic::{
    Diagnostic, DiagnosticDetails, OpenAnswer, RecordMilestone, ReviewUpdate, SaveDiagnostic,
    SaveOutcome, SectionAnswer, SectionReview, DIMENSIONS,
};
use crate::models::session::Session;
use crate::models::version::{UnresolvedConflict, Version};
use crate::repositories::version_repo::VersionRepo;

const COLUMNS: &str = "id, status, municipality_id, respondent_name, respondent_email, \
    respondent_role, consent, classroom_session_id, reviewer_id, respondent_user_id, \
    term_id, latest_version, submitted_at, finalized_at, created_at, updated_at";

pub struct DiagnosticRepo;

impl DiagnosticRepo {
    // ── Reads ────────────────────────────────────────────────────────

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Diagnostic>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM diagnostics WHERE id = $1");
        sqlx::query_as::<_, Diagnostic>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The record a session originated, if any. A session maps to at most
    /// one diagnostic.
    pub async fn find_by_session(
        pool: &PgPool,
        session_id: DbId,
    ) -> Result<Option<Diagnostic>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM diagnostics WHERE classroom_session_id = $1");
        sqlx::query_as::<_, Diagnostic>(&query)
            .bind(session_id)
            .fetch_optional(pool)
            .await
    }

    /// All diagnostics bound to a session, with latest status and update
    /// time. Feeds the poll payload.
    pub async fn list_by_session(
        pool: &PgPool,
        session_id: DbId,
    ) -> Result<Vec<Diagnostic>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM diagnostics
             WHERE classroom_session_id = $1
             ORDER BY updated_at DESC"
        );
        sqlx::query_as::<_, Diagnostic>(&query)
            .bind(session_id)
            .fetch_all(pool)
            .await
    }

    /// The full current projection: record plus all joined rows.
    pub async fn details(pool: &PgPool, id: DbId) -> RepoResult<DiagnosticDetails> {
        let mut conn = pool.acquire().await?;
        let diagnostic = Self::find_by_id(pool, id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "diagnostic",
                id,
            })?;
        let sections = fetch_sections(&mut conn, id).await?;
        let reviews = fetch_reviews(&mut conn, id).await?;
        let open_answers = fetch_open_answers(&mut conn, id).await?;
        Ok(DiagnosticDetails {
            diagnostic,
            sections,
            reviews,
            open_answers,
        })
    }

    // ── Shared save path (autosave and versioned save) ───────────────

    /// Upsert the current projection and, when requested, append a ledger
    /// entry with conflict detection against the writer's base version.
    ///
    /// The record is located by explicit id or by the classroom session; a
    /// missing record is created in DRAFT bound to the session's
    /// municipality. Without a session, an explicit municipality id creates
    /// a standalone record.
    pub async fn save(
        pool: &PgPool,
        session: Option<&Session>,
        author_role: AuthorRole,
        input: &SaveDiagnostic,
    ) -> RepoResult<SaveOutcome> {
        for section in &input.sections {
            validate_dimension(&section.dimension)?;
        }

        let mut tx = pool.begin().await?;

        let record = match (input.diagnostic_id, session) {
            (Some(id), _) => lock_by_id(&mut tx, id).await?.ok_or(CoreError::NotFound {
                entity: "diagnostic",
                id,
            })?,
            (None, Some(session)) => match lock_by_session(&mut tx, session.id).await? {
                Some(existing) => existing,
                None => create_record(&mut tx, Some(session), input).await?,
            },
            (None, None) => create_record(&mut tx, None, input).await?,
        };
        let latest_before = record.latest_version;

        // Respondent fields are patched, never blanked, by partial payloads.
        let query = format!(
            "UPDATE diagnostics SET
                respondent_name = COALESCE($2, respondent_name),
                respondent_email = COALESCE($3, respondent_email),
                respondent_role = COALESCE($4, respondent_role),
                consent = COALESCE($5, consent),
                term_id = COALESCE($6, term_id),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let record = sqlx::query_as::<_, Diagnostic>(&query)
            .bind(record.id)
            .bind(&input.respondent_name)
            .bind(&input.respondent_email)
            .bind(&input.respondent_role)
            .bind(input.consent)
            .bind(input.term_id)
            .fetch_one(&mut *tx)
            .await?;

        for section in &input.sections {
            write_section_answer(
                &mut tx,
                record.id,
                &section.section_code,
                &section.dimension,
                &section.topics,
                section.elaboration.as_deref(),
            )
            .await?;
        }
        for (key, answer) in &input.open_answers {
            sqlx::query(
                "INSERT INTO open_answers (diagnostic_id, question_key, answer)
                 VALUES ($1, $2, $3)
                 ON CONFLICT ON CONSTRAINT uq_open_answers_question
                 DO UPDATE SET answer = EXCLUDED.answer",
            )
            .bind(record.id)
            .bind(key)
            .bind(answer)
            .execute(&mut *tx)
            .await?;
        }

        let outcome = if input.create_version {
            let mut snap = snapshot_of(&mut tx, &record).await?;
            let conflict =
                detect_conflict(&mut tx, record.id, latest_before, input.base_version_number, &snap)
                    .await?;
            if let Some(block) = &conflict {
                snapshot::attach_conflict(&mut snap, block);
            }
            let version =
                VersionRepo::append(&mut tx, record.id, author_role, None, &snap).await?;
            SaveOutcome {
                diagnostic_id: record.id,
                version_number: version.version_number,
                version_created: true,
                conflict,
            }
        } else {
            SaveOutcome {
                diagnostic_id: record.id,
                version_number: latest_before,
                version_created: false,
                conflict: None,
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    // ── Submission ───────────────────────────────────────────────────

    /// Transition to SUBMITTED and append one ledger entry. Submission is
    /// always historically recorded, and re-submitting an already-SUBMITTED
    /// record appends again rather than failing.
    pub async fn submit(pool: &PgPool, id: DbId) -> RepoResult<SaveOutcome> {
        let mut tx = pool.begin().await?;
        let record = lock_by_id(&mut tx, id).await?.ok_or(CoreError::NotFound {
            entity: "diagnostic",
            id,
        })?;
        match record.status.parse::<DiagnosticStatus>()? {
            DiagnosticStatus::Draft | DiagnosticStatus::Submitted => {}
            other => {
                return Err(CoreError::Validation(format!(
                    "Cannot submit a diagnostic in status {other}"
                ))
                .into())
            }
        }

        let query = format!(
            "UPDATE diagnostics SET
                status = 'SUBMITTED',
                submitted_at = COALESCE(submitted_at, NOW()),
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let record = sqlx::query_as::<_, Diagnostic>(&query)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let snap = snapshot_of(&mut tx, &record).await?;
        let version =
            VersionRepo::append(&mut tx, id, AuthorRole::Participant, None, &snap).await?;
        tx.commit().await?;
        Ok(SaveOutcome {
            diagnostic_id: id,
            version_number: version.version_number,
            version_created: true,
            conflict: None,
        })
    }

    // ── Consultant review ────────────────────────────────────────────

    /// Replace the consultant-analysis rows wholesale and append a
    /// REVIEWER-authored ledger entry. Scores on both sides are recomputed,
    /// since each dimension's score depends on answers and analysis
    /// together.
    pub async fn review_update(
        pool: &PgPool,
        id: DbId,
        reviewer_id: DbId,
        input: &ReviewUpdate,
    ) -> RepoResult<SaveOutcome> {
        for review in &input.reviews {
            validate_dimension(&review.dimension)?;
        }

        let mut tx = pool.begin().await?;
        let record = lock_by_id(&mut tx, id).await?.ok_or(CoreError::NotFound {
            entity: "diagnostic",
            id,
        })?;
        if record.status.parse::<DiagnosticStatus>()?.is_terminal() {
            return Err(
                CoreError::Validation("Cannot review a finalized diagnostic".into()).into(),
            );
        }

        let answers = fetch_sections(&mut tx, id).await?;

        // Wholesale replacement: delete-then-insert, not patch.
        sqlx::query("DELETE FROM section_reviews WHERE diagnostic_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for review in &input.reviews {
            let answer = answers
                .iter()
                .find(|a| a.section_code == review.section_code && a.dimension == review.dimension);
            let empty: Vec<String> = Vec::new();
            let dim = DimensionInput {
                topics: answer.map(|a| a.topics.0.as_slice()).unwrap_or(&empty),
                elaboration: answer.and_then(|a| a.elaboration.as_deref()),
                reviewer_elaboration: review.analysis.as_deref(),
            };
            sqlx::query(
                "INSERT INTO section_reviews
                    (diagnostic_id, section_code, dimension, analysis, reviewer_score)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(id)
            .bind(&review.section_code)
            .bind(&review.dimension)
            .bind(&review.analysis)
            .bind(scoring::reviewer_score(&dim))
            .execute(&mut *tx)
            .await?;
        }

        // Respondent-facing scores shift when analysis appears or vanishes.
        for answer in &answers {
            let analysis = input
                .reviews
                .iter()
                .find(|r| r.section_code == answer.section_code && r.dimension == answer.dimension)
                .and_then(|r| r.analysis.as_deref());
            let dim = DimensionInput {
                topics: &answer.topics.0,
                elaboration: answer.elaboration.as_deref(),
                reviewer_elaboration: analysis,
            };
            sqlx::query("UPDATE section_answers SET score = $2 WHERE id = $1")
                .bind(answer.id)
                .bind(scoring::dimension_score(&dim))
                .execute(&mut *tx)
                .await?;
        }

        let query = format!(
            "UPDATE diagnostics SET
                reviewer_id = COALESCE(reviewer_id, $2),
                status = CASE WHEN status = 'SUBMITTED' THEN 'IN_REVIEW' ELSE status END,
                updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let record = sqlx::query_as::<_, Diagnostic>(&query)
            .bind(id)
            .bind(reviewer_id)
            .fetch_one(&mut *tx)
            .await?;

        let snap = snapshot_of(&mut tx, &record).await?;
        let version = VersionRepo::append(&mut tx, id, AuthorRole::Reviewer, None, &snap).await?;
        tx.commit().await?;
        Ok(SaveOutcome {
            diagnostic_id: id,
            version_number: version.version_number,
            version_created: true,
            conflict: None,
        })
    }

    /// Stamp the terminal FINALIZED status and append the closing entry.
    pub async fn finalize(pool: &PgPool, id: DbId) -> RepoResult<SaveOutcome> {
        let mut tx = pool.begin().await?;
        let record = lock_by_id(&mut tx, id).await?.ok_or(CoreError::NotFound {
            entity: "diagnostic",
            id,
        })?;
        match record.status.parse::<DiagnosticStatus>()? {
            DiagnosticStatus::Submitted | DiagnosticStatus::InReview => {}
            other => {
                return Err(CoreError::Validation(format!(
                    "Cannot finalize a diagnostic in status {other}"
                ))
                .into())
            }
        }

        let query = format!(
            "UPDATE diagnostics SET
                status = 'FINALIZED', finalized_at = NOW(), updated_at = NOW()
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        let record = sqlx::query_as::<_, Diagnostic>(&query)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let snap = snapshot_of(&mut tx, &record).await?;
        let version = VersionRepo::append(&mut tx, id, AuthorRole::Reviewer, None, &snap).await?;
        tx.commit().await?;
        Ok(SaveOutcome {
            diagnostic_id: id,
            version_number: version.version_number,
            version_created: true,
            conflict: None,
        })
    }

    // ── Milestones ───────────────────────────────────────────────────

    /// Snapshot the entire current state under a human label, whether or not
    /// anything changed since the last entry. The default label is `T<n>`
    /// with `n` the count of prior milestones.
    pub async fn record_milestone(
        pool: &PgPool,
        id: DbId,
        author_role: AuthorRole,
        input: &RecordMilestone,
    ) -> RepoResult<Version> {
        let mut tx = pool.begin().await?;
        let record = lock_by_id(&mut tx, id).await?.ok_or(CoreError::NotFound {
            entity: "diagnostic",
            id,
        })?;

        let label = match &input.label {
            Some(label) if !label.trim().is_empty() => label.clone(),
            _ => {
                let (milestones,): (i64,) = sqlx::query_as(
                    "SELECT COUNT(*) FROM versions
                     WHERE diagnostic_id = $1 AND label IS NOT NULL",
                )
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
                format!("T{milestones}")
            }
        };

        let snap = snapshot_of(&mut tx, &record).await?;
        let version =
            VersionRepo::append(&mut tx, id, author_role, Some(&label), &snap).await?;
        tx.commit().await?;
        Ok(version)
    }

    // ── Conflict resolution ──────────────────────────────────────────

    /// Record that a flagged conflict was resolved. Resolution is an
    /// appended fact, never a mutation of the flagged entry.
    pub async fn resolve_conflict(
        pool: &PgPool,
        id: DbId,
        conflict_version_number: i32,
        resolver_id: DbId,
    ) -> RepoResult<SaveOutcome> {
        let mut tx = pool.begin().await?;
        let record = lock_by_id(&mut tx, id).await?.ok_or(CoreError::NotFound {
            entity: "diagnostic",
            id,
        })?;

        let flagged = VersionRepo::find_by_number(&mut tx, id, conflict_version_number)
            .await?
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "No version {conflict_version_number} for this diagnostic"
                ))
            })?;
        if !snapshot::conflict_of(&flagged.snapshot).is_some_and(|c| c.detected) {
            return Err(CoreError::Validation(format!(
                "Version {conflict_version_number} carries no conflict"
            ))
            .into());
        }

        let mut snap = snapshot_of(&mut tx, &record).await?;
        snapshot::attach_resolution(
            &mut snap,
            &ConflictResolution {
                resolved_from_version_number: conflict_version_number,
                resolved_by: resolver_id,
                resolved_at: Utc::now(),
            },
        );
        let version = VersionRepo::append(&mut tx, id, AuthorRole::Reviewer, None, &snap).await?;
        tx.commit().await?;
        Ok(SaveOutcome {
            diagnostic_id: id,
            version_number: version.version_number,
            version_created: true,
            conflict: None,
        })
    }

    /// Scan a session's ledgers for conflicts no later entry has resolved.
    pub async fn list_unresolved_conflicts(
        pool: &PgPool,
        session_id: DbId,
    ) -> Result<Vec<UnresolvedConflict>, sqlx::Error> {
        let versions = VersionRepo::list_for_session(pool, session_id).await?;

        let resolved: Vec<(DbId, i32)> = versions
            .iter()
            .filter_map(|v| {
                snapshot::resolution_of(&v.snapshot)
                    .map(|r| (v.diagnostic_id, r.resolved_from_version_number))
            })
            .collect();

        Ok(versions
            .iter()
            .filter_map(|v| {
                let conflict = snapshot::conflict_of(&v.snapshot).filter(|c| c.detected)?;
                if resolved.contains(&(v.diagnostic_id, v.version_number)) {
                    return None;
                }
                Some(UnresolvedConflict {
                    diagnostic_id: v.diagnostic_id,
                    version_number: v.version_number,
                    fields: conflict.fields,
                    base_version_number: conflict.base_version_number,
                    server_version_number: conflict.server_version_number,
                    created_at: v.created_at,
                })
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Transaction helpers
// ---------------------------------------------------------------------------

fn validate_dimension(dimension: &str) -> Result<(), CoreError> {
    if DIMENSIONS.contains(&dimension) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unknown dimension: {dimension}"
        )))
    }
}

async fn lock_by_id(
    conn: &mut PgConnection,
    id: DbId,
) -> Result<Option<Diagnostic>, sqlx::Error> {
    let query = format!("SELECT {COLUMNS} FROM diagnostics WHERE id = $1 FOR UPDATE");
    sqlx::query_as::<_, Diagnostic>(&query)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

async fn lock_by_session(
    conn: &mut PgConnection,
    session_id: DbId,
) -> Result<Option<Diagnostic>, sqlx::Error> {
    let query =
        format!("SELECT {COLUMNS} FROM diagnostics WHERE classroom_session_id = $1 FOR UPDATE");
    sqlx::query_as::<_, Diagnostic>(&query)
        .bind(session_id)
        .fetch_optional(&mut *conn)
        .await
}

/// Create a DRAFT record. The municipality comes from the payload when
/// given, the session otherwise; with neither, creation fails.
async fn create_record(
    conn: &mut PgConnection,
    session: Option<&Session>,
    input: &SaveDiagnostic,
) -> RepoResult<Diagnostic> {
    let municipality_id = input
        .municipality_id
        .clone()
        .filter(|m| !m.trim().is_empty())
        .or_else(|| session.map(|s| s.municipality_id.clone()))
        .ok_or_else(|| CoreError::Validation("MISSING_MUNICIPALITY".into()))?;
    let known: Option<(String,)> =
        sqlx::query_as("SELECT id FROM municipalities WHERE id = $1")
            .bind(&municipality_id)
            .fetch_optional(&mut *conn)
            .await?;
    if known.is_none() {
        return Err(CoreError::Validation(format!(
            "Unknown municipality: {municipality_id}"
        ))
        .into());
    }
    let query = format!(
        "INSERT INTO diagnostics
            (status, municipality_id, classroom_session_id, consent)
         VALUES ('DRAFT', $1, $2, false)
         RETURNING {COLUMNS}"
    );
    Ok(sqlx::query_as::<_, Diagnostic>(&query)
        .bind(&municipality_id)
        .bind(session.map(|s| s.id))
        .fetch_one(&mut *conn)
        .await?)
}

/// Delete-then-insert one dimension's answer row, computing its score
/// against the stored reviewer analysis for the same dimension.
async fn write_section_answer(
    conn: &mut PgConnection,
    diagnostic_id: DbId,
    section_code: &str,
    dimension: &str,
    topics: &[String],
    elaboration: Option<&str>,
) -> Result<(), sqlx::Error> {
    let analysis: Option<String> = sqlx::query_scalar(
        "SELECT analysis FROM section_reviews
         WHERE diagnostic_id = $1 AND section_code = $2 AND dimension = $3",
    )
    .bind(diagnostic_id)
    .bind(section_code)
    .bind(dimension)
    .fetch_optional(&mut *conn)
    .await?
    .flatten();

    let dim = DimensionInput {
        topics,
        elaboration,
        reviewer_elaboration: analysis.as_deref(),
    };
    let score = scoring::dimension_score(&dim);

    sqlx::query(
        "DELETE FROM section_answers
         WHERE diagnostic_id = $1 AND section_code = $2 AND dimension = $3",
    )
    .bind(diagnostic_id)
    .bind(section_code)
    .bind(dimension)
    .execute(&mut *conn)
    .await?;
    sqlx::query(
        "INSERT INTO section_answers
            (diagnostic_id, section_code, dimension, topics, elaboration, score)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(diagnostic_id)
    .bind(section_code)
    .bind(dimension)
    .bind(sqlx::types::Json(topics))
    .bind(elaboration)
    .bind(score)
    .execute(&mut *conn)
    .await?;

    // Keep the paired reviewer score in step with the new answer.
    sqlx::query(
        "UPDATE section_reviews SET reviewer_score = $4
         WHERE diagnostic_id = $1 AND section_code = $2 AND dimension = $3",
    )
    .bind(diagnostic_id)
    .bind(section_code)
    .bind(dimension)
    .bind(scoring::reviewer_score(&dim))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn fetch_sections(
    conn: &mut PgConnection,
    diagnostic_id: DbId,
) -> Result<Vec<SectionAnswer>, sqlx::Error> {
    sqlx::query_as::<_, SectionAnswer>(
        "SELECT id, diagnostic_id, section_code, dimension, topics, elaboration, score
         FROM section_answers
         WHERE diagnostic_id = $1
         ORDER BY section_code, dimension",
    )
    .bind(diagnostic_id)
    .fetch_all(&mut *conn)
    .await
}

async fn fetch_reviews(
    conn: &mut PgConnection,
    diagnostic_id: DbId,
) -> Result<Vec<SectionReview>, sqlx::Error> {
    sqlx::query_as::<_, SectionReview>(
        "SELECT id, diagnostic_id, section_code, dimension, analysis, reviewer_score
         FROM section_reviews
         WHERE diagnostic_id = $1
         ORDER BY section_code, dimension",
    )
    .bind(diagnostic_id)
    .fetch_all(&mut *conn)
    .await
}

async fn fetch_open_answers(
    conn: &mut PgConnection,
    diagnostic_id: DbId,
) -> Result<Vec<OpenAnswer>, sqlx::Error> {
    sqlx::query_as::<_, OpenAnswer>(
        "SELECT id, diagnostic_id, question_key, answer
         FROM open_answers
         WHERE diagnostic_id = $1
         ORDER BY question_key",
    )
    .bind(diagnostic_id)
    .fetch_all(&mut *conn)
    .await
}

/// Build the versioned snapshot envelope from the record's full current
/// state, re-read inside the caller's transaction.
async fn snapshot_of(conn: &mut PgConnection, record: &Diagnostic) -> RepoResult<Value> {
    let sections = fetch_sections(conn, record.id).await?;
    let reviews = fetch_reviews(conn, record.id).await?;
    let open_answers = fetch_open_answers(conn, record.id).await?;

    let mut open = Map::new();
    for row in &open_answers {
        open.insert(row.question_key.clone(), Value::String(row.answer.clone()));
    }

    let mut body = Map::new();
    body.insert("status".into(), Value::String(record.status.clone()));
    body.insert(
        "respondent".into(),
        serde_json::json!({
            "name": record.respondent_name,
            "email": record.respondent_email,
            "role": record.respondent_role,
            "consent": record.consent,
        }),
    );
    body.insert("sections".into(), to_json(&sections)?);
    body.insert("reviews".into(), to_json(&reviews)?);
    body.insert("openAnswers".into(), Value::Object(open));
    Ok(snapshot::envelope(body))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, RepoError> {
    serde_json::to_value(value)
        .map_err(|err| CoreError::Internal(format!("Snapshot serialization failed: {err}")).into())
}

/// Compare the writer's claimed base against the ledger head. Divergence
/// never rejects the write; it yields an evidence block for the new entry.
async fn detect_conflict(
    conn: &mut PgConnection,
    diagnostic_id: DbId,
    latest_before: i32,
    base_version_number: Option<i32>,
    new_snapshot: &Value,
) -> RepoResult<Option<ConflictBlock>> {
    let Some(base) = base_version_number else {
        return Ok(None);
    };
    if base >= latest_before {
        return Ok(None);
    }
    let fields = match VersionRepo::find_by_number(conn, diagnostic_id, base).await? {
        Some(base_entry) => snapshot::diff_answer_groups(new_snapshot, &base_entry.snapshot),
        None => Vec::new(),
    };
    Ok(Some(ConflictBlock {
        detected: true,
        fields,
        base_version_number: base,
        server_version_number: latest_before,
    }))
}
