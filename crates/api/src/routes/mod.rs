pub mod diagnostic;
pub mod health;
pub mod municipality;
pub mod session;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /municipalities                           seeded registry (staff)
///
/// /sessions                                 list, create (staff)
/// /sessions/join                            anonymous join by code+token or id
/// /sessions/{id}                            get
/// /sessions/{id}/transition                 lifecycle change (POST)
/// /sessions/{id}/expiry                     replace deadline (PUT)
/// /sessions/{id}/participants               list participants
/// /sessions/{id}/poll                       facilitator dashboard read
/// /sessions/{id}/audit                      audit trail (manage rights)
///
/// /diagnostics/save                         autosave / versioned save (POST)
/// /diagnostics/{id}                         full current projection
/// /diagnostics/{id}/submit                  submit (POST)
/// /diagnostics/{id}/review                  consultant analysis (PUT)
/// /diagnostics/{id}/finalize                finalize (POST)
/// /diagnostics/{id}/milestones              record labelled snapshot (POST)
/// /diagnostics/{id}/versions                full ledger, oldest first
/// /diagnostics/{id}/resolve-conflict        append resolution entry (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/municipalities", municipality::router())
        .nest("/sessions", session::router())
        .nest("/diagnostics", diagnostic::router())
}
