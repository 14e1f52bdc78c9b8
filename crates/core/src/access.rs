//! Layered access gate for session and diagnostic operations.
//!
//! One entry point, [`authorize`], evaluated by every handler. Layers are
//! tried in order until one grants or all deny:
//!
//! 1. elevated role (admin-equivalent)
//! 2. resource ownership (session facilitator, assigned reviewer, respondent)
//! 3. standing grant over the owning client, project, or hub axis
//! 4. classroom-scoped anonymous access obtained through the join flow
//!
//! The gate returns a tagged decision, never a bare boolean, so the caller
//! always has the denial reason for the mandatory audit record.

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::lifecycle::SessionStatus;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Anonymous classroom credential established by the join flow. Holding one
/// means the caller presented a valid (code, token) pair or joined by
/// session id earlier in the request.
#[derive(Debug, Clone, Copy)]
pub struct ClassroomGrant {
    pub session_id: DbId,
}

/// Everything known about the caller of one request.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub identity: Option<Identity>,
    pub classroom: Option<ClassroomGrant>,
}

impl Caller {
    pub fn authenticated(identity: Identity) -> Self {
        Caller {
            identity: Some(identity),
            classroom: None,
        }
    }

    pub fn anonymous(grant: ClassroomGrant) -> Self {
        Caller {
            identity: None,
            classroom: Some(grant),
        }
    }
}

/// The session facts the gate needs. `effective_status` must come from
/// [`crate::lifecycle::resolve_effective_status`], never the stored column.
#[derive(Debug, Clone)]
pub struct SessionFacts {
    pub id: DbId,
    pub facilitator_id: DbId,
    pub client_id: Option<DbId>,
    pub project_id: Option<DbId>,
    pub hub: Option<String>,
    pub effective_status: SessionStatus,
}

/// The diagnostic facts the gate needs, when the target is a diagnostic.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticFacts {
    pub id: DbId,
    pub classroom_session_id: Option<DbId>,
    pub reviewer_id: Option<DbId>,
    pub respondent_user_id: Option<DbId>,
}

/// What the gate is protecting in this call. A diagnostic created outside
/// any session has no session facts; classroom credentials can never reach
/// such a target.
#[derive(Debug, Clone)]
pub struct Target {
    pub session: Option<SessionFacts>,
    pub diagnostic: Option<DiagnosticFacts>,
}

/// The operations the gate distinguishes. Facilitator-only operations never
/// accept a classroom credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ViewSession,
    ManageSession,
    PollSession,
    SaveDiagnostic,
    SubmitDiagnostic,
    ReviewDiagnostic,
    RecordMilestone,
    ResolveConflict,
    ListVersions,
}

impl Operation {
    /// Whether an anonymous classroom credential can ever satisfy this
    /// operation.
    fn classroom_eligible(&self) -> bool {
        matches!(
            self,
            Operation::ViewSession
                | Operation::SaveDiagnostic
                | Operation::SubmitDiagnostic
                | Operation::ListVersions
        )
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Which layer granted the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantVia {
    Elevated,
    Owner,
    ExplicitGrant,
    Classroom,
    /// Classroom credential against an expired session: only submission is
    /// let through, and the caller must audit the forced submit.
    ClassroomExpired,
}

/// Why the gate denied. Serialized into audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    Unauthenticated,
    NotOwner,
    InvalidToken,
    SessionExpired,
    NotInSession,
    SessionNotJoinable,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::Unauthenticated => "UNAUTHENTICATED",
            DenialReason::NotOwner => "NOT_OWNER",
            DenialReason::InvalidToken => "INVALID_TOKEN",
            DenialReason::SessionExpired => "SESSION_EXPIRED",
            DenialReason::NotInSession => "NOT_IN_SESSION",
            DenialReason::SessionNotJoinable => "SESSION_NOT_JOINABLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Granted(GrantVia),
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted(_))
    }

    pub fn denial_reason(&self) -> Option<DenialReason> {
        match self {
            AccessDecision::Denied(reason) => Some(*reason),
            AccessDecision::Granted(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// The gate
// ---------------------------------------------------------------------------

pub fn authorize(caller: &Caller, operation: Operation, target: &Target) -> AccessDecision {
    if let Some(identity) = &caller.identity {
        // Layer 1: elevated role.
        if identity.is_elevated() {
            return AccessDecision::Granted(GrantVia::Elevated);
        }

        // Layer 2: resource ownership.
        if is_owner(identity, target) {
            return AccessDecision::Granted(GrantVia::Owner);
        }

        // Layer 3: standing grant over the owning axis.
        if target
            .session
            .as_ref()
            .is_some_and(|session| has_explicit_grant(identity, session))
        {
            return AccessDecision::Granted(GrantVia::ExplicitGrant);
        }
    }

    // Layer 4: classroom-scoped anonymous access.
    if let Some(grant) = &caller.classroom {
        if !operation.classroom_eligible() {
            return AccessDecision::Denied(DenialReason::NotOwner);
        }
        return authorize_classroom(grant, operation, target);
    }

    if caller.identity.is_some() {
        AccessDecision::Denied(DenialReason::NotOwner)
    } else {
        AccessDecision::Denied(DenialReason::Unauthenticated)
    }
}

fn is_owner(identity: &Identity, target: &Target) -> bool {
    if let Some(session) = &target.session {
        if session.facilitator_id == identity.user_id {
            return true;
        }
    }
    if let Some(diagnostic) = &target.diagnostic {
        if diagnostic.reviewer_id == Some(identity.user_id)
            || diagnostic.respondent_user_id == Some(identity.user_id)
        {
            return true;
        }
    }
    false
}

fn has_explicit_grant(identity: &Identity, session: &SessionFacts) -> bool {
    if let Some(client_id) = session.client_id {
        if identity.owned_client_ids.contains(&client_id) {
            return true;
        }
    }
    if let Some(project_id) = session.project_id {
        if identity.owned_project_ids.contains(&project_id) {
            return true;
        }
    }
    if let Some(hub) = &session.hub {
        if identity.owned_hubs.iter().any(|h| h == hub) {
            return true;
        }
    }
    false
}

fn authorize_classroom(
    grant: &ClassroomGrant,
    operation: Operation,
    target: &Target,
) -> AccessDecision {
    let Some(session) = &target.session else {
        return AccessDecision::Denied(DenialReason::NotInSession);
    };
    if grant.session_id != session.id {
        return AccessDecision::Denied(DenialReason::NotInSession);
    }
    if let Some(diagnostic) = &target.diagnostic {
        if diagnostic.classroom_session_id != Some(session.id) {
            return AccessDecision::Denied(DenialReason::NotInSession);
        }
    }
    match session.effective_status {
        SessionStatus::Preparation | SessionStatus::Active => {
            AccessDecision::Granted(GrantVia::Classroom)
        }
        // Expiry forces submission rather than blocking it.
        SessionStatus::Closed if operation == Operation::SubmitDiagnostic => {
            AccessDecision::Granted(GrantVia::ClassroomExpired)
        }
        SessionStatus::Closed => AccessDecision::Denied(DenialReason::SessionExpired),
        SessionStatus::Cancelled => AccessDecision::Denied(DenialReason::SessionNotJoinable),
    }
}
