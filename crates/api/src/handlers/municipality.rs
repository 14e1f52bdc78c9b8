//! Municipality registry reads.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use civica_db::repositories::MunicipalityRepo;

use crate::error::AppResult;
use crate::handlers::gate;
use crate::middleware::identity::AuthUser;
use crate::middleware::request_info::RequestInfo;
use crate::response::DataResponse;
use crate::state::AppState;

/// `GET /municipalities` — the seeded registry, for the session-open form.
pub async fn list_municipalities(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    info: RequestInfo,
) -> AppResult<impl IntoResponse> {
    gate::require_staff(&state, &user, &info).await?;
    let municipalities = MunicipalityRepo::list(&state.pool).await?;
    Ok(Json(DataResponse {
        data: municipalities,
    }))
}
