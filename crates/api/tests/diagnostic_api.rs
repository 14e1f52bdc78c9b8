//! HTTP-level integration tests for the `/diagnostics` endpoints: the
//! shared save path, conflict evidence, forced submission, review and
//! milestones.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{audit_count, body_json, build_test_app, consultant, get, post_json, put_json, ADMIN};
use sqlx::PgPool;

use civica_db::models::session::{CreateSession, CreatedSession};
use civica_db::repositories::SessionRepo;

const SAO_PAULO: &str = "3550308";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn open_session(pool: &PgPool, facilitator_id: i64) -> CreatedSession {
    let input = CreateSession {
        municipality_id: SAO_PAULO.to_string(),
        title: None,
        description: None,
        client_id: None,
        project_id: None,
        hub: None,
        cycle_start_year: None,
        cycle_end_year: None,
        expires_at: Some(Utc::now() + Duration::hours(4)),
        start_in_preparation: false,
    };
    SessionRepo::create(pool, facilitator_id, &input).await.unwrap()
}

fn save_body(created: &CreatedSession, elaboration: &str) -> serde_json::Value {
    serde_json::json!({
        "code": created.session.code,
        "token": created.join_token,
        "sections": [{
            "section_code": "saude",
            "dimension": "positive",
            "topics": ["atencao basica"],
            "elaboration": elaboration,
        }],
        "create_version": true,
    })
}

// ---------------------------------------------------------------------------
// Save path
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_participant_save_creates_versioned_record(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    let response = post_json(
        &app,
        "/api/v1/diagnostics/save",
        None,
        save_body(&created, "rede bem distribuída"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["version_created"], true);
    assert_eq!(json["data"]["version_number"], 1);
    assert!(json["data"].get("conflict").is_none());

    let id = json["data"]["diagnostic_id"].as_i64().unwrap();
    assert_eq!(audit_count(&pool, "diagnostic_save", Some(id)).await, 1);

    // Topics plus elaboration score 7 for the respondent.
    let details = get(&app, &format!("/api/v1/diagnostics/{id}"), Some(ADMIN)).await;
    assert_eq!(details.status(), StatusCode::OK);
    let details = body_json(details).await;
    assert_eq!(details["data"]["status"], "DRAFT");
    assert_eq!(details["data"]["sections"][0]["score"], 7);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_autosave_does_not_append(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    let mut body = save_body(&created, "rascunho");
    body["create_version"] = serde_json::json!(false);
    let response = post_json(&app, "/api/v1/diagnostics/save", None, body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["version_created"], false);
    assert_eq!(json["data"]["version_number"], 0);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_wrong_classroom_token_is_rejected_and_audited(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    let mut body = save_body(&created, "qualquer");
    body["token"] = serde_json::json!("not-the-token");
    let response = post_json(&app, "/api/v1/diagnostics/save", None, body).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "INVALID_TOKEN");

    assert_eq!(
        audit_count(&pool, "access_denied", Some(created.session.id)).await,
        1
    );
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_save_without_any_credentials_is_unauthenticated(pool: PgPool) {
    let app = build_test_app(pool.clone());
    let response = post_json(
        &app,
        "/api/v1/diagnostics/save",
        None,
        serde_json::json!({ "sections": [] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["code"], "UNAUTHENTICATED");
    assert_eq!(audit_count(&pool, "access_denied", None).await, 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_elevated_caller_creates_standalone_diagnostic(pool: PgPool) {
    let app = build_test_app(pool.clone());

    let response = post_json(
        &app,
        "/api/v1/diagnostics/save",
        Some(ADMIN),
        serde_json::json!({
            "municipality_id": SAO_PAULO,
            "respondent_name": "Secretaria de Planejamento",
            "sections": [{
                "section_code": "saude",
                "dimension": "positive",
                "topics": ["atencao basica"],
            }],
            "create_version": true,
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["version_number"], 1);
    let id = json["data"]["diagnostic_id"].as_i64().unwrap();

    // Standalone: no session binding.
    let details = body_json(
        get(&app, &format!("/api/v1/diagnostics/{id}"), Some(ADMIN)).await,
    )
    .await;
    assert!(details["data"]["classroom_session_id"].is_null());
    assert_eq!(details["data"]["municipality_id"], SAO_PAULO);

    // Without a session, the municipality is mandatory.
    let missing = post_json(
        &app,
        "/api/v1/diagnostics/save",
        Some(ADMIN),
        serde_json::json!({ "sections": [] }),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(missing).await["error"], "MISSING_MUNICIPALITY");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_consultant_cannot_create_standalone_diagnostic(pool: PgPool) {
    let app = build_test_app(pool.clone());
    let response = post_json(
        &app,
        "/api/v1/diagnostics/save",
        Some(consultant(10)),
        serde_json::json!({ "municipality_id": SAO_PAULO, "sections": [] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "NOT_OWNER");
}

// ---------------------------------------------------------------------------
// Conflict evidence and resolution
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_stale_base_flags_conflict_and_resolution_clears_it(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    // v1, then v2 built on it.
    let first = body_json(
        post_json(
            &app,
            "/api/v1/diagnostics/save",
            None,
            save_body(&created, "primeira versão"),
        )
        .await,
    )
    .await;
    let id = first["data"]["diagnostic_id"].as_i64().unwrap();

    let mut second = save_body(&created, "segunda versão");
    second["base_version_number"] = serde_json::json!(1);
    post_json(&app, "/api/v1/diagnostics/save", None, second).await;

    // A writer still on v1 saves: accepted, flagged, never blocked.
    let mut stale = save_body(&created, "escrita atrasada");
    stale["base_version_number"] = serde_json::json!(1);
    let response = post_json(&app, "/api/v1/diagnostics/save", None, stale).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["data"]["version_number"], 3);
    let conflict = &json["data"]["conflict"];
    assert_eq!(conflict["detected"], true);
    assert_eq!(conflict["baseVersionNumber"], 1);
    assert_eq!(conflict["serverVersionNumber"], 2);
    assert!(!conflict["fields"].as_array().unwrap().is_empty());

    // The facilitator poll surfaces it until someone resolves it.
    let poll = body_json(
        get(
            &app,
            &format!("/api/v1/sessions/{}/poll", created.session.id),
            Some(consultant(10)),
        )
        .await,
    )
    .await;
    let unresolved = poll["data"]["unresolved_conflicts"].as_array().unwrap();
    assert_eq!(unresolved.len(), 1);
    assert_eq!(unresolved[0]["version_number"], 3);

    let resolve = post_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/resolve-conflict"),
        Some(consultant(10)),
        serde_json::json!({ "version_number": 3 }),
    )
    .await;
    assert_eq!(resolve.status(), StatusCode::OK);
    assert_eq!(audit_count(&pool, "conflict_resolve", Some(id)).await, 1);

    let poll = body_json(
        get(
            &app,
            &format!("/api/v1/sessions/{}/poll", created.session.id),
            Some(consultant(10)),
        )
        .await,
    )
    .await;
    assert!(poll["data"]["unresolved_conflicts"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_resolving_an_unflagged_version_is_rejected(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    let first = body_json(
        post_json(
            &app,
            "/api/v1/diagnostics/save",
            None,
            save_body(&created, "sem conflito"),
        )
        .await,
    )
    .await;
    let id = first["data"]["diagnostic_id"].as_i64().unwrap();

    let response = post_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/resolve-conflict"),
        Some(ADMIN),
        serde_json::json!({ "version_number": 1 }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Expiry forces submission
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_expired_session_denies_save_but_forces_submit(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    let first = body_json(
        post_json(
            &app,
            "/api/v1/diagnostics/save",
            None,
            save_body(&created, "antes do prazo"),
        )
        .await,
    )
    .await;
    let id = first["data"]["diagnostic_id"].as_i64().unwrap();

    SessionRepo::set_expiry(&pool, created.session.id, Some(Utc::now() - Duration::minutes(5)))
        .await
        .unwrap();

    // Saving is over, and the denial itself flips the open record: the work
    // already saved must not be stranded in DRAFT.
    let save = post_json(
        &app,
        "/api/v1/diagnostics/save",
        None,
        save_body(&created, "tarde demais"),
    )
    .await;
    assert_eq!(save.status(), StatusCode::GONE);
    assert_eq!(body_json(save).await["code"], "SESSION_EXPIRED");

    let (status, submitted_at): (String, Option<chrono::DateTime<Utc>>) =
        sqlx::query_as("SELECT status, submitted_at FROM diagnostics WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(status, "SUBMITTED");
    assert!(submitted_at.is_some());
    assert_eq!(forced_submit_count(&pool, id).await, 1);

    // Explicit submission afterwards still lands and keeps the original
    // submission stamp.
    let submit = post_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/submit"),
        None,
        serde_json::json!({
            "code": created.session.code,
            "token": created.join_token,
        }),
    )
    .await;
    assert_eq!(submit.status(), StatusCode::OK);

    let (after,): (Option<chrono::DateTime<Utc>>,) =
        sqlx::query_as("SELECT submitted_at FROM diagnostics WHERE id = $1")
            .bind(id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(after, submitted_at);
    assert_eq!(forced_submit_count(&pool, id).await, 2);
}

async fn forced_submit_count(pool: &PgPool, diagnostic_id: i64) -> i64 {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM audit_log
         WHERE action = 'diagnostic_submit' AND entity_id = $1
           AND details_json->>'reason' = 'CLASSROOM_EXPIRED_FORCED_SUBMIT'",
    )
    .bind(diagnostic_id)
    .fetch_one(pool)
    .await
    .unwrap();
    count
}

// ---------------------------------------------------------------------------
// Review, finalize, milestones
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn test_review_scores_and_finalize(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    let first = body_json(
        post_json(
            &app,
            "/api/v1/diagnostics/save",
            None,
            save_body(&created, "com elaboração"),
        )
        .await,
    )
    .await;
    let id = first["data"]["diagnostic_id"].as_i64().unwrap();

    let submit = post_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/submit"),
        None,
        serde_json::json!({
            "code": created.session.code,
            "token": created.join_token,
        }),
    )
    .await;
    assert_eq!(submit.status(), StatusCode::OK);

    // The session facilitator reviews without being the assigned reviewer.
    let review = put_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/review"),
        Some(consultant(10)),
        serde_json::json!({
            "reviews": [{
                "section_code": "saude",
                "dimension": "positive",
                "analysis": "análise consistente",
            }],
        }),
    )
    .await;
    assert_eq!(review.status(), StatusCode::OK);
    assert_eq!(body_json(review).await["data"]["version_number"], 3);

    let details = body_json(
        get(&app, &format!("/api/v1/diagnostics/{id}"), Some(consultant(10))).await,
    )
    .await;
    assert_eq!(details["data"]["status"], "IN_REVIEW");
    // All three signals present: respondent and reviewer both see 8.
    assert_eq!(details["data"]["sections"][0]["score"], 8);
    assert_eq!(details["data"]["reviews"][0]["reviewer_score"], 8);

    let finalize = post_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/finalize"),
        Some(consultant(10)),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(finalize.status(), StatusCode::OK);
    assert_eq!(audit_count(&pool, "diagnostic_finalize", Some(id)).await, 1);

    // Terminal: no further review.
    let late = put_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/review"),
        Some(consultant(10)),
        serde_json::json!({ "reviews": [] }),
    )
    .await;
    assert_eq!(late.status(), StatusCode::BAD_REQUEST);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_anonymous_cannot_review(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    let first = body_json(
        post_json(
            &app,
            "/api/v1/diagnostics/save",
            None,
            save_body(&created, "texto"),
        )
        .await,
    )
    .await;
    let id = first["data"]["diagnostic_id"].as_i64().unwrap();

    let response = put_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/review"),
        None,
        serde_json::json!({ "reviews": [] }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn test_milestone_labels_and_ledger_listing(pool: PgPool) {
    let created = open_session(&pool, 10).await;
    let app = build_test_app(pool.clone());

    let first = body_json(
        post_json(
            &app,
            "/api/v1/diagnostics/save",
            None,
            save_body(&created, "estado inicial"),
        )
        .await,
    )
    .await;
    let id = first["data"]["diagnostic_id"].as_i64().unwrap();

    let t0 = post_json(
        &app,
        &format!("/api/v1/diagnostics/{id}/milestones"),
        Some(consultant(10)),
        serde_json::json!({}),
    )
    .await;
    assert_eq!(t0.status(), StatusCode::CREATED);
    let t0 = body_json(t0).await;
    assert_eq!(t0["data"]["label"], "T0");
    assert_eq!(t0["data"]["version_number"], 2);

    let named = body_json(
        post_json(
            &app,
            &format!("/api/v1/diagnostics/{id}/milestones"),
            Some(consultant(10)),
            serde_json::json!({ "label": "Oficina 2" }),
        )
        .await,
    )
    .await;
    assert_eq!(named["data"]["label"], "Oficina 2");

    let t2 = body_json(
        post_json(
            &app,
            &format!("/api/v1/diagnostics/{id}/milestones"),
            Some(consultant(10)),
            serde_json::json!({}),
        )
        .await,
    )
    .await;
    assert_eq!(t2["data"]["label"], "T2");

    let versions = body_json(
        get(
            &app,
            &format!("/api/v1/diagnostics/{id}/versions"),
            Some(consultant(10)),
        )
        .await,
    )
    .await;
    let versions = versions["data"].as_array().unwrap();
    assert_eq!(versions.len(), 4);
    let numbers: Vec<i64> = versions
        .iter()
        .map(|v| v["version_number"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}
