//! Identity extractor for Axum handlers.
//!
//! Authentication happens upstream; the gateway forwards a resolved identity
//! in trusted headers which this service accepts unconditionally:
//!
//! - `x-user-id`       caller's internal user id
//! - `x-user-role`     role name (`admin`, `supervisor`, `consultant`, ...)
//! - `x-owned-clients` comma-separated client ids under a standing grant
//! - `x-owned-projects` comma-separated project ids under a standing grant
//! - `x-owned-hubs`    comma-separated hub names under a standing grant

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use civica_core::error::CoreError;
use civica_core::identity::Identity;
use civica_core::types::DbId;

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated caller extracted from the gateway identity headers.
///
/// Use this as an extractor parameter in any handler that requires an
/// authenticated (non-anonymous) caller.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Identity);

/// Optional variant for endpoints that also serve anonymous classroom
/// participants. Absent headers yield `None`; malformed headers reject.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<Identity>);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match MaybeAuthUser::from_request_parts(parts, state).await? {
            MaybeAuthUser(Some(identity)) => Ok(AuthUser(identity)),
            MaybeAuthUser(None) => Err(AppError::Core(CoreError::Unauthorized(
                "Missing identity headers".into(),
            ))),
        }
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(user_id) = header_str(parts, "x-user-id") else {
            return Ok(MaybeAuthUser(None));
        };
        let user_id: DbId = user_id.parse().map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Malformed x-user-id header".into()))
        })?;
        let role = header_str(parts, "x-user-role")
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized("Missing x-user-role header".into()))
            })?
            .to_string();

        Ok(MaybeAuthUser(Some(Identity {
            user_id,
            role,
            owned_client_ids: parse_id_list(parts, "x-owned-clients")?,
            owned_project_ids: parse_id_list(parts, "x-owned-projects")?,
            owned_hubs: parse_str_list(parts, "x-owned-hubs"),
        })))
    }
}

fn header_str<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn parse_id_list(parts: &Parts, name: &str) -> Result<Vec<DbId>, AppError> {
    header_str(parts, name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<DbId>().map_err(|_| {
                        AppError::Core(CoreError::Unauthorized(format!(
                            "Malformed {name} header"
                        )))
                    })
                })
                .collect()
        })
        .unwrap_or_else(|| Ok(Vec::new()))
}

fn parse_str_list(parts: &Parts, name: &str) -> Vec<String> {
    header_str(parts, name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
