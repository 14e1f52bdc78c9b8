//! Shared harness for HTTP-level integration tests.
//!
//! Builds the same router (middleware stack included) that production uses,
//! and provides small request helpers around `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use civica_api::config::ServerConfig;
use civica_api::router::build_app_router;
use civica_api::state::AppState;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool. Mirrors the construction in `main.rs` so tests
/// exercise the same stack that production uses.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config)
}

/// An authenticated caller for the trusted-gateway identity headers.
#[derive(Debug, Clone, Copy)]
pub struct As {
    pub user_id: i64,
    pub role: &'static str,
}

pub const ADMIN: As = As {
    user_id: 1,
    role: "admin",
};

pub fn consultant(user_id: i64) -> As {
    As {
        user_id,
        role: "consultant",
    }
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    user: Option<As>,
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder
            .header("x-user-id", user.user_id.to_string())
            .header("x-user-role", user.role);
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

pub async fn get(app: &Router, uri: &str, user: Option<As>) -> Response {
    send(app, Method::GET, uri, user, None).await
}

pub async fn post_json(
    app: &Router,
    uri: &str,
    user: Option<As>,
    body: serde_json::Value,
) -> Response {
    send(app, Method::POST, uri, user, Some(body)).await
}

pub async fn put_json(
    app: &Router,
    uri: &str,
    user: Option<As>,
    body: serde_json::Value,
) -> Response {
    send(app, Method::PUT, uri, user, Some(body)).await
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Count audit entries for an action, optionally narrowed to one entity id.
pub async fn audit_count(pool: &PgPool, action: &str, entity_id: Option<i64>) -> i64 {
    let (count,): (i64,) = match entity_id {
        Some(id) => {
            sqlx::query_as(
                "SELECT COUNT(*) FROM audit_log WHERE action = $1 AND entity_id = $2",
            )
            .bind(action)
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
        }
        None => sqlx::query_as("SELECT COUNT(*) FROM audit_log WHERE action = $1")
            .bind(action)
            .fetch_one(pool)
            .await
            .unwrap(),
    };
    count
}
