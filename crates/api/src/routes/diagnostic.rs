//! Route definitions for the `/diagnostics` resource.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::diagnostic;
use crate::state::AppState;

/// Routes mounted at `/diagnostics`.
///
/// ```text
/// POST   /save                    -> save_diagnostic (anonymous or staff)
/// GET    /{id}                    -> get_diagnostic
/// POST   /{id}/submit             -> submit_diagnostic (anonymous or staff)
/// PUT    /{id}/review             -> review_diagnostic
/// POST   /{id}/finalize           -> finalize_diagnostic
/// POST   /{id}/milestones         -> record_milestone
/// GET    /{id}/versions           -> list_versions
/// POST   /{id}/resolve-conflict   -> resolve_conflict
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/save", post(diagnostic::save_diagnostic))
        .route("/{id}", get(diagnostic::get_diagnostic))
        .route("/{id}/submit", post(diagnostic::submit_diagnostic))
        .route("/{id}/review", put(diagnostic::review_diagnostic))
        .route("/{id}/finalize", post(diagnostic::finalize_diagnostic))
        .route("/{id}/milestones", post(diagnostic::record_milestone))
        .route("/{id}/versions", get(diagnostic::list_versions))
        .route("/{id}/resolve-conflict", post(diagnostic::resolve_conflict))
}
