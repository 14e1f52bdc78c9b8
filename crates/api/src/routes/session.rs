//! Route definitions for the `/sessions` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::session;
use crate::state::AppState;

/// Routes mounted at `/sessions`.
///
/// ```text
/// GET    /                    -> list_sessions
/// POST   /                    -> create_session
/// POST   /join                -> join_session (anonymous)
/// GET    /{id}                -> get_session
/// POST   /{id}/transition     -> transition_session
/// PUT    /{id}/expiry         -> set_expiry
/// GET    /{id}/participants   -> list_participants
/// GET    /{id}/poll           -> poll_session
/// GET    /{id}/audit          -> session_audit_trail
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(session::list_sessions).post(session::create_session))
        .route("/join", post(session::join_session))
        .route("/{id}", get(session::get_session))
        .route("/{id}/transition", post(session::transition_session))
        .route("/{id}/expiry", put(session::set_expiry))
        .route("/{id}/participants", get(session::list_participants))
        .route("/{id}/poll", get(session::poll_session))
        .route("/{id}/audit", get(session::session_audit_trail))
}
