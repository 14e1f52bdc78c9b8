//! Diagnostic handlers: the shared save path, submission, review,
//! milestones, the ledger and conflict resolution.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use civica_core::access::{DenialReason, GrantVia, Operation, Target};
use civica_core::audit::{actions, entities, reasons};
use civica_core::error::CoreError;
use civica_core::lifecycle::{AuthorRole, DiagnosticStatus};
use civica_core::types::DbId;
use civica_db::models::diagnostic::{
    Diagnostic, RecordMilestone, ReviewUpdate, SaveDiagnostic,
};
use civica_db::models::session::Session;
use civica_db::repositories::{DiagnosticRepo, SessionRepo, VersionRepo};
use serde::Deserialize;

use crate::audit;
use crate::error::{AppError, AppResult};
use crate::handlers::gate::{self, ClassroomCredentials};
use crate::middleware::identity::{AuthUser, MaybeAuthUser};
use crate::middleware::request_info::RequestInfo;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

/// Save request: classroom credentials (for anonymous callers) plus the
/// payload for the shared save path.
#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(flatten)]
    pub credentials: ClassroomCredentials,
    #[serde(flatten)]
    pub save: SaveDiagnostic,
}

#[derive(Debug, Deserialize, Default)]
pub struct SubmitRequest {
    #[serde(flatten)]
    pub credentials: ClassroomCredentials,
}

#[derive(Debug, Deserialize)]
pub struct ResolveConflictRequest {
    /// Ledger entry carrying the conflict to mark resolved.
    pub version_number: i32,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /diagnostics/save` — autosave and versioned save, for participants
/// and staff alike.
pub async fn save_diagnostic(
    State(state): State<AppState>,
    MaybeAuthUser(identity): MaybeAuthUser,
    info: RequestInfo,
    Json(input): Json<SaveRequest>,
) -> AppResult<impl IntoResponse> {
    let classroom_session =
        gate::resolve_classroom_session(&state, &input.credentials, &info).await?;

    // The gate target is the record's own session when an explicit id is
    // given, the classroom session otherwise.
    let (diagnostic, target_session) = match input.save.diagnostic_id {
        Some(id) => {
            let (diagnostic, session) = load_target(&state, id).await?;
            (Some(diagnostic), session)
        }
        None => {
            let existing = match &classroom_session {
                Some(session) => {
                    DiagnosticRepo::find_by_session(&state.pool, session.id).await?
                }
                None => None,
            };
            (existing, classroom_session.clone())
        }
    };

    let target = Target {
        session: target_session.as_ref().map(gate::session_facts).transpose()?,
        diagnostic: diagnostic.as_ref().map(gate::diagnostic_facts),
    };
    let caller = gate::caller(identity.clone(), classroom_session.as_ref());
    if let Err(denial) = gate::enforce(
        &state,
        &caller,
        Operation::SaveDiagnostic,
        &target,
        entities::DIAGNOSTIC,
        diagnostic.as_ref().map(|d| d.id),
        &info,
    )
    .await
    {
        // Expiry closed the door mid-edit. The still-open record is flipped
        // to SUBMITTED so the work already saved is not stranded in DRAFT.
        if matches!(denial, AppError::Denied(DenialReason::SessionExpired)) {
            force_submit_expired(
                &state,
                diagnostic.as_ref(),
                identity.as_ref().map(|i| i.user_id),
                &info,
            )
            .await;
        }
        return Err(denial);
    }

    let outcome = DiagnosticRepo::save(
        &state.pool,
        target_session.as_ref(),
        author_role(&identity),
        &input.save,
    )
    .await?;

    audit::record(
        &state.pool,
        audit::entry(
            entities::DIAGNOSTIC,
            Some(outcome.diagnostic_id),
            actions::DIAGNOSTIC_SAVE,
            identity.as_ref().map(|i| i.user_id),
            &info,
            Some(serde_json::json!({
                "version_created": outcome.version_created,
                "version_number": outcome.version_number,
                "conflict_detected": outcome.conflict.is_some(),
            })),
        ),
    )
    .await;

    Ok(Json(DataResponse { data: outcome }))
}

/// `GET /diagnostics/{id}` — the full current projection.
pub async fn get_diagnostic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let (diagnostic, session) = load_target(&state, id).await?;
    authorize(
        &state,
        &user,
        Operation::ViewSession,
        &diagnostic,
        session.as_ref(),
        &info,
    )
    .await?;

    let details = DiagnosticRepo::details(&state.pool, id).await?;
    Ok(Json(DataResponse { data: details }))
}

/// `POST /diagnostics/{id}/submit`
///
/// Submission against an expired session is let through and audited as a
/// forced submit; expiry never swallows participant work.
pub async fn submit_diagnostic(
    State(state): State<AppState>,
    MaybeAuthUser(identity): MaybeAuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
    Json(input): Json<SubmitRequest>,
) -> AppResult<impl IntoResponse> {
    let classroom_session =
        gate::resolve_classroom_session(&state, &input.credentials, &info).await?;
    let (diagnostic, session) = load_target(&state, id).await?;

    let target = Target {
        session: session.as_ref().map(gate::session_facts).transpose()?,
        diagnostic: Some(gate::diagnostic_facts(&diagnostic)),
    };
    let caller = gate::caller(identity.clone(), classroom_session.as_ref());
    let via = gate::enforce(
        &state,
        &caller,
        Operation::SubmitDiagnostic,
        &target,
        entities::DIAGNOSTIC,
        Some(id),
        &info,
    )
    .await?;

    let outcome = DiagnosticRepo::submit(&state.pool, id).await?;

    let mut details = serde_json::json!({ "version_number": outcome.version_number });
    if via == GrantVia::ClassroomExpired {
        details["reason"] = serde_json::json!(reasons::CLASSROOM_EXPIRED_FORCED_SUBMIT);
    }
    audit::record(
        &state.pool,
        audit::entry(
            entities::DIAGNOSTIC,
            Some(id),
            actions::DIAGNOSTIC_SUBMIT,
            identity.as_ref().map(|i| i.user_id),
            &info,
            Some(details),
        ),
    )
    .await;

    Ok(Json(DataResponse { data: outcome }))
}

/// `PUT /diagnostics/{id}/review` — wholesale consultant-analysis update.
pub async fn review_diagnostic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
    Json(input): Json<ReviewUpdate>,
) -> AppResult<impl IntoResponse> {
    let (diagnostic, session) = load_target(&state, id).await?;
    authorize(
        &state,
        &user,
        Operation::ReviewDiagnostic,
        &diagnostic,
        session.as_ref(),
        &info,
    )
    .await?;

    let outcome = DiagnosticRepo::review_update(&state.pool, id, user.user_id, &input).await?;

    audit::record(
        &state.pool,
        audit::entry(
            entities::DIAGNOSTIC,
            Some(id),
            actions::DIAGNOSTIC_REVIEW,
            Some(user.user_id),
            &info,
            Some(serde_json::json!({ "version_number": outcome.version_number })),
        ),
    )
    .await;

    Ok(Json(DataResponse { data: outcome }))
}

/// `POST /diagnostics/{id}/finalize`
pub async fn finalize_diagnostic(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let (diagnostic, session) = load_target(&state, id).await?;
    authorize(
        &state,
        &user,
        Operation::ReviewDiagnostic,
        &diagnostic,
        session.as_ref(),
        &info,
    )
    .await?;

    let outcome = DiagnosticRepo::finalize(&state.pool, id).await?;

    audit::record(
        &state.pool,
        audit::entry(
            entities::DIAGNOSTIC,
            Some(id),
            actions::DIAGNOSTIC_FINALIZE,
            Some(user.user_id),
            &info,
            Some(serde_json::json!({ "version_number": outcome.version_number })),
        ),
    )
    .await;

    Ok(Json(DataResponse { data: outcome }))
}

/// `POST /diagnostics/{id}/milestones` — labelled full snapshot.
pub async fn record_milestone(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
    Json(input): Json<RecordMilestone>,
) -> AppResult<impl IntoResponse> {
    let (diagnostic, session) = load_target(&state, id).await?;
    authorize(
        &state,
        &user,
        Operation::RecordMilestone,
        &diagnostic,
        session.as_ref(),
        &info,
    )
    .await?;

    let version =
        DiagnosticRepo::record_milestone(&state.pool, id, AuthorRole::Reviewer, &input).await?;

    audit::record(
        &state.pool,
        audit::entry(
            entities::VERSION,
            Some(version.id),
            actions::DIAGNOSTIC_MILESTONE,
            Some(user.user_id),
            &info,
            Some(serde_json::json!({
                "diagnostic_id": id,
                "label": version.label.clone(),
                "version_number": version.version_number,
            })),
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: version })))
}

/// `GET /diagnostics/{id}/versions` — the full ledger, oldest first.
pub async fn list_versions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let (diagnostic, session) = load_target(&state, id).await?;
    authorize(
        &state,
        &user,
        Operation::ListVersions,
        &diagnostic,
        session.as_ref(),
        &info,
    )
    .await?;

    let versions = VersionRepo::list(&state.pool, id).await?;
    Ok(Json(DataResponse { data: versions }))
}

/// `POST /diagnostics/{id}/resolve-conflict` — append a resolution entry for
/// one flagged conflict.
pub async fn resolve_conflict(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
    Json(input): Json<ResolveConflictRequest>,
) -> AppResult<impl IntoResponse> {
    let (diagnostic, session) = load_target(&state, id).await?;
    authorize(
        &state,
        &user,
        Operation::ResolveConflict,
        &diagnostic,
        session.as_ref(),
        &info,
    )
    .await?;

    let outcome =
        DiagnosticRepo::resolve_conflict(&state.pool, id, input.version_number, user.user_id)
            .await?;

    audit::record(
        &state.pool,
        audit::entry(
            entities::DIAGNOSTIC,
            Some(id),
            actions::CONFLICT_RESOLVE,
            Some(user.user_id),
            &info,
            Some(serde_json::json!({
                "resolved_from_version_number": input.version_number,
                "version_number": outcome.version_number,
            })),
        ),
    )
    .await;

    Ok(Json(DataResponse { data: outcome }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Load a diagnostic and the session it is bound to, if any.
async fn load_target(state: &AppState, id: DbId) -> AppResult<(Diagnostic, Option<Session>)> {
    let diagnostic = DiagnosticRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "diagnostic",
            id,
        })?;
    let session = match diagnostic.classroom_session_id {
        Some(session_id) => SessionRepo::find_by_id(&state.pool, session_id).await?,
        None => None,
    };
    Ok((diagnostic, session))
}

/// Gate an authenticated-only diagnostic operation.
async fn authorize(
    state: &AppState,
    user: &civica_core::identity::Identity,
    operation: Operation,
    diagnostic: &Diagnostic,
    session: Option<&Session>,
    info: &RequestInfo,
) -> AppResult<()> {
    let target = Target {
        session: session.map(gate::session_facts).transpose()?,
        diagnostic: Some(gate::diagnostic_facts(diagnostic)),
    };
    gate::enforce(
        state,
        &civica_core::access::Caller::authenticated(user.clone()),
        operation,
        &target,
        entities::DIAGNOSTIC,
        Some(diagnostic.id),
        info,
    )
    .await?;
    Ok(())
}

/// Submit a DRAFT record whose session expired, best-effort: the caller's
/// denial goes out unchanged whether or not the flip lands.
async fn force_submit_expired(
    state: &AppState,
    diagnostic: Option<&Diagnostic>,
    performed_by: Option<DbId>,
    info: &RequestInfo,
) {
    let Some(diagnostic) = diagnostic else { return };
    if diagnostic.status.parse::<DiagnosticStatus>().ok() != Some(DiagnosticStatus::Draft) {
        return;
    }
    match DiagnosticRepo::submit(&state.pool, diagnostic.id).await {
        Ok(outcome) => {
            audit::record(
                &state.pool,
                audit::entry(
                    entities::DIAGNOSTIC,
                    Some(diagnostic.id),
                    actions::DIAGNOSTIC_SUBMIT,
                    performed_by,
                    info,
                    Some(serde_json::json!({
                        "version_number": outcome.version_number,
                        "reason": reasons::CLASSROOM_EXPIRED_FORCED_SUBMIT,
                    })),
                ),
            )
            .await;
        }
        Err(err) => {
            tracing::debug!(
                error = %err,
                diagnostic_id = diagnostic.id,
                "Forced submit of expired-session record failed"
            );
        }
    }
}

/// Ledger author attribution: staff write as REVIEWER, everyone else as
/// PARTICIPANT.
fn author_role(identity: &Option<civica_core::identity::Identity>) -> AuthorRole {
    match identity {
        Some(identity) if identity.is_facilitator() => AuthorRole::Reviewer,
        _ => AuthorRole::Participant,
    }
}
