//! Session handlers: open, list, inspect, transition, join and poll.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use civica_core::access::{Caller, DenialReason, Operation, Target};
use civica_core::audit::{actions, entities};
use civica_core::error::CoreError;
use civica_core::lifecycle::{self, SessionStatus};
use civica_core::types::{DbId, Timestamp};
use civica_db::models::diagnostic::Diagnostic;
use civica_db::models::participant::{CreateParticipant, Participant};
use civica_db::models::session::{CreateSession, Session};
use civica_db::models::version::UnresolvedConflict;
use civica_db::repositories::{AuditRepo, DiagnosticRepo, ParticipantRepo, SessionRepo};
use serde::{Deserialize, Serialize};

use crate::audit;
use crate::error::{AppError, AppResult};
use crate::handlers::gate::{self, ClassroomCredentials};
use crate::middleware::identity::AuthUser;
use crate::middleware::request_info::RequestInfo;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request/response DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: SessionStatus,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    pub status: Option<SessionStatus>,
}

#[derive(Debug, Deserialize)]
pub struct SetExpiryRequest {
    pub expires_at: Option<Timestamp>,
}

/// Join request: classroom credentials plus the participant's details.
#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    #[serde(flatten)]
    pub credentials: ClassroomCredentials,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// A session as readers should see it: the stored row plus the status after
/// lazy expiry is applied.
#[derive(Debug, Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: Session,
    pub effective_status: SessionStatus,
}

impl SessionView {
    fn of(session: Session) -> AppResult<Self> {
        let effective_status = session.effective_status(chrono::Utc::now())?;
        Ok(SessionView {
            session,
            effective_status,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub session_id: DbId,
    pub municipality_id: String,
    pub title: String,
    pub effective_status: SessionStatus,
    pub participant: Participant,
}

/// One facilitator poll: lifecycle, the session's records and every conflict
/// no later ledger entry has resolved.
#[derive(Debug, Serialize)]
pub struct PollResponse {
    #[serde(flatten)]
    pub session: SessionView,
    pub participant_count: i64,
    pub diagnostics: Vec<Diagnostic>,
    pub unresolved_conflicts: Vec<UnresolvedConflict>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `POST /sessions` — open a session for one municipality.
pub async fn create_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Json(input): Json<CreateSession>,
) -> AppResult<impl IntoResponse> {
    gate::require_staff(&state, &user, &info).await?;

    let created = SessionRepo::create(&state.pool, user.user_id, &input).await?;
    audit::record(
        &state.pool,
        audit::entry(
            entities::SESSION,
            Some(created.session.id),
            actions::SESSION_CREATE,
            Some(user.user_id),
            &info,
            Some(serde_json::json!({
                "municipality_id": created.session.municipality_id.clone(),
                "code": created.session.code.clone(),
                "status": created.session.status.clone(),
            })),
        ),
    )
    .await;

    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// `GET /sessions` — facilitator listing with participant counts.
///
/// Elevated roles see every session; a consultant sees only their own.
/// `?status=` filters on the stored status.
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Query(query): Query<ListSessionsQuery>,
) -> AppResult<impl IntoResponse> {
    gate::require_staff(&state, &user, &info).await?;
    let facilitator_id = (!user.is_elevated()).then_some(user.user_id);
    let sessions = SessionRepo::list(&state.pool, facilitator_id, query.status).await?;
    Ok(Json(DataResponse { data: sessions }))
}

/// `GET /sessions/{id}`
pub async fn get_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let session = load_session(&state, id).await?;
    let target = Target {
        session: Some(gate::session_facts(&session)?),
        diagnostic: None,
    };
    gate::enforce(
        &state,
        &Caller::authenticated(user),
        Operation::ViewSession,
        &target,
        entities::SESSION,
        Some(id),
        &info,
    )
    .await?;

    Ok(Json(DataResponse {
        data: SessionView::of(session)?,
    }))
}

/// `POST /sessions/{id}/transition` — explicit lifecycle change.
pub async fn transition_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
    Json(input): Json<TransitionRequest>,
) -> AppResult<impl IntoResponse> {
    let session = load_session(&state, id).await?;
    let target = Target {
        session: Some(gate::session_facts(&session)?),
        diagnostic: None,
    };
    gate::enforce(
        &state,
        &Caller::authenticated(user.clone()),
        Operation::ManageSession,
        &target,
        entities::SESSION,
        Some(id),
        &info,
    )
    .await?;

    let current = session.parsed_status()?;
    if !lifecycle::can_transition(current, input.status) {
        return Err(CoreError::Validation(format!(
            "Illegal session transition {current} -> {}",
            input.status
        ))
        .into());
    }

    // Activating clears expired rivals first; a genuinely live rival for the
    // municipality surfaces as MUNICIPALITY_ALREADY_ACTIVE.
    let updated = SessionRepo::update_status(&state.pool, id, input.status)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "session",
            id,
        })?;

    audit::record(
        &state.pool,
        audit::entry(
            entities::SESSION,
            Some(id),
            actions::SESSION_TRANSITION,
            Some(user.user_id),
            &info,
            Some(serde_json::json!({
                "from": current.as_str(),
                "to": input.status.as_str(),
            })),
        ),
    )
    .await;

    Ok(Json(DataResponse {
        data: SessionView::of(updated)?,
    }))
}

/// `PUT /sessions/{id}/expiry` — replace or disable the deadline.
pub async fn set_expiry(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
    Json(input): Json<SetExpiryRequest>,
) -> AppResult<impl IntoResponse> {
    let session = load_session(&state, id).await?;
    let target = Target {
        session: Some(gate::session_facts(&session)?),
        diagnostic: None,
    };
    gate::enforce(
        &state,
        &Caller::authenticated(user.clone()),
        Operation::ManageSession,
        &target,
        entities::SESSION,
        Some(id),
        &info,
    )
    .await?;

    let updated = SessionRepo::set_expiry(&state.pool, id, input.expires_at)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "session",
            id,
        })?;

    audit::record(
        &state.pool,
        audit::entry(
            entities::SESSION,
            Some(id),
            actions::SESSION_SET_EXPIRY,
            Some(user.user_id),
            &info,
            Some(serde_json::json!({ "expires_at": input.expires_at })),
        ),
    )
    .await;

    Ok(Json(DataResponse {
        data: SessionView::of(updated)?,
    }))
}

/// `POST /sessions/join` — anonymous participant entry point.
///
/// Accepts a (code, token) pair or a session id from a shared link. Every
/// failed attempt is audited with its reason.
pub async fn join_session(
    State(state): State<AppState>,
    info: RequestInfo,
    Json(input): Json<JoinRequest>,
) -> AppResult<impl IntoResponse> {
    let session = match resolve_join_target(&state, &input.credentials).await? {
        Ok(session) => session,
        Err((session_id, reason)) => {
            return join_failed(&state, session_id, reason, &info).await;
        }
    };

    let effective = session.effective_status(chrono::Utc::now())?;
    if !lifecycle::can_join(effective) {
        let reason = match effective {
            SessionStatus::Closed => DenialReason::SessionExpired,
            _ => DenialReason::SessionNotJoinable,
        };
        // Persist the lazily observed expiry while we are here.
        if effective == SessionStatus::Closed {
            if let Err(err) = SessionRepo::close_if_expired(&state.pool, session.id).await {
                tracing::debug!(error = %err, session_id = session.id, "Lazy close failed");
            }
        }
        return join_failed(&state, Some(session.id), reason, &info).await;
    }

    let participant = ParticipantRepo::create(
        &state.pool,
        session.id,
        &CreateParticipant {
            name: input.name,
            email: input.email,
            phone: input.phone,
        },
    )
    .await?;

    audit::record(
        &state.pool,
        audit::entry(
            entities::SESSION,
            Some(session.id),
            actions::SESSION_JOIN_SUCCESS,
            None,
            &info,
            Some(serde_json::json!({ "participant_id": participant.id })),
        ),
    )
    .await;

    Ok(Json(DataResponse {
        data: JoinResponse {
            session_id: session.id,
            municipality_id: session.municipality_id.clone(),
            title: session.title.clone(),
            effective_status: effective,
            participant,
        },
    }))
}

/// `GET /sessions/{id}/participants`
pub async fn list_participants(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let session = load_session(&state, id).await?;
    let target = Target {
        session: Some(gate::session_facts(&session)?),
        diagnostic: None,
    };
    gate::enforce(
        &state,
        &Caller::authenticated(user),
        Operation::ViewSession,
        &target,
        entities::SESSION,
        Some(id),
        &info,
    )
    .await?;

    let participants = ParticipantRepo::list_by_session(&state.pool, id).await?;
    Ok(Json(DataResponse { data: participants }))
}

/// `GET /sessions/{id}/poll` — the facilitator dashboard read.
///
/// Composes lifecycle (after lazy expiry), the session's records and the
/// unresolved conflicts in one payload. The expiry write is best-effort and
/// never blocks the read.
pub async fn poll_session(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if let Err(err) = SessionRepo::close_if_expired(&state.pool, id).await {
        tracing::debug!(error = %err, session_id = id, "Lazy close failed");
    }

    let session = load_session(&state, id).await?;
    let target = Target {
        session: Some(gate::session_facts(&session)?),
        diagnostic: None,
    };
    gate::enforce(
        &state,
        &Caller::authenticated(user),
        Operation::PollSession,
        &target,
        entities::SESSION,
        Some(id),
        &info,
    )
    .await?;

    let participant_count = ParticipantRepo::count_by_session(&state.pool, id).await?;
    let diagnostics = DiagnosticRepo::list_by_session(&state.pool, id).await?;
    let unresolved_conflicts = DiagnosticRepo::list_unresolved_conflicts(&state.pool, id).await?;

    Ok(Json(DataResponse {
        data: PollResponse {
            session: SessionView::of(session)?,
            participant_count,
            diagnostics,
            unresolved_conflicts,
        },
    }))
}

/// `GET /sessions/{id}/audit` — the session's audit trail, newest first.
///
/// Only callers who could manage the session may read its trail; the read
/// itself is not audited.
pub async fn session_audit_trail(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let session = load_session(&state, id).await?;
    let target = Target {
        session: Some(gate::session_facts(&session)?),
        diagnostic: None,
    };
    gate::enforce(
        &state,
        &Caller::authenticated(user),
        Operation::ManageSession,
        &target,
        entities::SESSION,
        Some(id),
        &info,
    )
    .await?;

    let entries = AuditRepo::list_for_entity(&state.pool, entities::SESSION, id).await?;
    Ok(Json(DataResponse { data: entries }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn load_session(state: &AppState, id: DbId) -> AppResult<Session> {
    SessionRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "session",
            id,
        }.into())
}

/// Locate the join target without going through the generic classroom
/// resolver: join failures carry their own audit action.
async fn resolve_join_target(
    state: &AppState,
    credentials: &ClassroomCredentials,
) -> AppResult<Result<Session, (Option<DbId>, DenialReason)>> {
    if let Some(session_id) = credentials.session_id {
        return Ok(match SessionRepo::find_by_id(&state.pool, session_id).await? {
            Some(session) => Ok(session),
            None => Err((Some(session_id), DenialReason::InvalidToken)),
        });
    }
    let Some(code) = credentials.code.as_deref() else {
        return Err(AppError::BadRequest(
            "A session id or a join code is required".into(),
        ));
    };
    let Some(session) = SessionRepo::find_by_code(&state.pool, code).await? else {
        return Ok(Err((None, DenialReason::InvalidToken)));
    };
    let token_ok = credentials
        .token
        .as_deref()
        .is_some_and(|token| civica_core::classroom::verify_token(token, &session.token_hash));
    if !token_ok {
        return Ok(Err((Some(session.id), DenialReason::InvalidToken)));
    }
    Ok(Ok(session))
}

async fn join_failed<T>(
    state: &AppState,
    session_id: Option<DbId>,
    reason: DenialReason,
    info: &RequestInfo,
) -> AppResult<T> {
    audit::record(
        &state.pool,
        audit::entry(
            entities::SESSION,
            session_id,
            actions::SESSION_JOIN_FAILED,
            None,
            info,
            Some(serde_json::json!({ "reason": reason.as_str() })),
        ),
    )
    .await;
    Err(AppError::Denied(reason))
}
