//! Shared access-gate plumbing for handlers.
//!
//! Every protected handler funnels through [`enforce`], which evaluates the
//! core gate and records the denial before the rejection leaves the service.
//! Classroom credentials arriving in request bodies are resolved here so the
//! token comparison and its audit happen in exactly one place.

use chrono::Utc;
use civica_core::access::{
    self, AccessDecision, Caller, ClassroomGrant, DenialReason, DiagnosticFacts, GrantVia,
    Operation, SessionFacts, Target,
};
use civica_core::audit::entities;
use civica_core::classroom;
use civica_core::types::DbId;
use civica_db::models::diagnostic::Diagnostic;
use civica_db::models::session::Session;
use civica_db::repositories::SessionRepo;
use serde::Deserialize;

use crate::audit;
use crate::error::{AppError, AppResult};
use crate::middleware::request_info::RequestInfo;
use crate::state::AppState;

/// Classroom credentials an anonymous participant carries in a request body.
/// A bare session id is accepted when it was obtained through the join flow;
/// a code must come with its token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassroomCredentials {
    pub session_id: Option<DbId>,
    pub code: Option<String>,
    pub token: Option<String>,
}

/// Resolve the session a set of classroom credentials points at, verifying
/// the token when the caller came in by code. Invalid credentials are
/// audited and rejected here.
pub async fn resolve_classroom_session(
    state: &AppState,
    credentials: &ClassroomCredentials,
    info: &RequestInfo,
) -> AppResult<Option<Session>> {
    if let Some(session_id) = credentials.session_id {
        let session = SessionRepo::find_by_id(&state.pool, session_id).await?;
        return match session {
            Some(session) => Ok(Some(session)),
            None => {
                deny(state, entities::SESSION, Some(session_id), DenialReason::InvalidToken, None, info)
                    .await
            }
        };
    }

    let Some(code) = credentials.code.as_deref() else {
        return Ok(None);
    };
    let Some(session) = SessionRepo::find_by_code(&state.pool, code).await? else {
        return deny(state, entities::SESSION, None, DenialReason::InvalidToken, None, info).await;
    };
    let token_ok = credentials
        .token
        .as_deref()
        .is_some_and(|token| classroom::verify_token(token, &session.token_hash));
    if !token_ok {
        return deny(
            state,
            entities::SESSION,
            Some(session.id),
            DenialReason::InvalidToken,
            None,
            info,
        )
        .await;
    }
    Ok(Some(session))
}

/// The gate-facing facts of a session row, with expiry already applied.
pub fn session_facts(session: &Session) -> AppResult<SessionFacts> {
    Ok(SessionFacts {
        id: session.id,
        facilitator_id: session.facilitator_id,
        client_id: session.client_id,
        project_id: session.project_id,
        hub: session.hub.clone(),
        effective_status: session.effective_status(Utc::now())?,
    })
}

pub fn diagnostic_facts(diagnostic: &Diagnostic) -> DiagnosticFacts {
    DiagnosticFacts {
        id: diagnostic.id,
        classroom_session_id: diagnostic.classroom_session_id,
        reviewer_id: diagnostic.reviewer_id,
        respondent_user_id: diagnostic.respondent_user_id,
    }
}

/// Evaluate the gate; on denial, record the audit entry and return the
/// matching error. Handlers never reject an operation without going through
/// here (or [`deny`] directly).
pub async fn enforce(
    state: &AppState,
    caller: &Caller,
    operation: Operation,
    target: &Target,
    entity: &'static str,
    entity_id: Option<DbId>,
    info: &RequestInfo,
) -> AppResult<GrantVia> {
    match access::authorize(caller, operation, target) {
        AccessDecision::Granted(via) => Ok(via),
        AccessDecision::Denied(reason) => {
            let performed_by = caller.identity.as_ref().map(|i| i.user_id);
            audit::record_denial(&state.pool, entity, entity_id, reason, performed_by, info).await;
            Err(AppError::Denied(reason))
        }
    }
}

/// Staff-only endpoints have no target to gate on; the role check is the
/// whole decision, and its denials are audited like any other.
pub async fn require_staff(
    state: &AppState,
    user: &civica_core::identity::Identity,
    info: &RequestInfo,
) -> AppResult<()> {
    if user.is_facilitator() {
        return Ok(());
    }
    deny(
        state,
        entities::SESSION,
        None,
        DenialReason::NotOwner,
        Some(user.user_id),
        info,
    )
    .await
}

/// Audit a denial decided outside the core gate and return it as the error.
pub async fn deny<T>(
    state: &AppState,
    entity: &'static str,
    entity_id: Option<DbId>,
    reason: DenialReason,
    performed_by: Option<DbId>,
    info: &RequestInfo,
) -> AppResult<T> {
    audit::record_denial(&state.pool, entity, entity_id, reason, performed_by, info).await;
    Err(AppError::Denied(reason))
}

/// Assemble a caller from the optional identity and an optionally resolved
/// classroom session.
pub fn caller(
    identity: Option<civica_core::identity::Identity>,
    classroom_session: Option<&Session>,
) -> Caller {
    Caller {
        identity,
        classroom: classroom_session.map(|s| ClassroomGrant { session_id: s.id }),
    }
}
