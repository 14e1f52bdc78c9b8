//! Route definitions for the `/municipalities` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::municipality;
use crate::state::AppState;

/// Routes mounted at `/municipalities`.
///
/// ```text
/// GET    /    -> list_municipalities
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(municipality::list_municipalities))
}
