//! Request metadata extractor feeding the audit trail.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::AppError;
use crate::state::AppState;

/// Caller metadata attached to every audit record.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_id: Option<String>,
}

impl FromRequestParts<AppState> for RequestInfo {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        // First hop of x-forwarded-for is the original client.
        let ip_address = header("x-forwarded-for")
            .map(|raw| raw.split(',').next().unwrap_or("").trim().to_string())
            .filter(|ip| !ip.is_empty());

        Ok(RequestInfo {
            ip_address,
            user_agent: header("user-agent"),
            request_id: header("x-request-id"),
        })
    }
}
