//! HTTP routing tests
//!
//! Router is driven through `tower::ServiceExt::oneshot`; the engine has
//! no configured sources so runs finish immediately with every strategy
//! skipped.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use pharmyrus_fusion::audit::BenchmarkTable;
use pharmyrus_fusion::engine::{EngineSettings, FusionEngine};
use pharmyrus_fusion::enrichment::EnrichmentCascade;
use pharmyrus_fusion::sources::SourceSet;
use pharmyrus_fusion::{build_router, AppState, TaskManager};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use uuid::Uuid;

fn test_app() -> Router {
    let engine = FusionEngine::new(
        EngineSettings::default(),
        SourceSet::default(),
        EnrichmentCascade::new(Vec::new()),
        Arc::new(BenchmarkTable::default()),
    );
    let tasks = TaskManager::new(Arc::new(engine), Duration::from_secs(60));
    build_router(AppState::new(tasks))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post_search(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/search")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = test_app();
    let (status, body) = send(&app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "pharmyrus-fusion");
    assert_eq!(body["defaultCountry"], "BR");
}

#[tokio::test]
async fn test_sync_search_returns_report() {
    let app = test_app();
    let (status, body) = send(&app, post_search(json!({ "molecule": "darolutamide" }))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["molecule"], "darolutamide");
    assert_eq!(body["summary"]["totalPatents"], 0);
    assert_eq!(body["strategies"]["applicant"]["status"], "skipped");
    assert_eq!(body["auditReport"]["status"], "NO_BENCHMARK");
}

#[tokio::test]
async fn test_blank_molecule_is_bad_request() {
    let app = test_app();
    let (status, body) = send(&app, post_search(json!({ "molecule": "  " }))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_async_search_then_poll() {
    let app = test_app();
    let (status, body) = send(
        &app,
        post_search(json!({ "molecule": "darolutamide", "options": { "asyncMode": true } })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let task_id = body["taskId"].as_str().unwrap().to_string();
    assert_eq!(body["statusUrl"], format!("/tasks/{}", task_id));

    for _ in 0..200 {
        let (status, body) = send(&app, get(&format!("/tasks/{}", task_id))).await;
        assert_eq!(status, StatusCode::OK);
        if body["state"] == "done" {
            assert_eq!(body["taskId"], task_id.as_str());
            assert_eq!(body["result"]["molecule"], "darolutamide");
            return;
        }
        assert_ne!(body["state"], "failed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task never finished");
}

#[tokio::test]
async fn test_unknown_task_is_not_found() {
    let app = test_app();
    let (status, body) = send(&app, get(&format!("/tasks/{}", Uuid::new_v4()))).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let delete = Request::builder()
        .method("DELETE")
        .uri(format!("/tasks/{}", Uuid::new_v4()))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, delete).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
