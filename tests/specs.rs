//! Workspace-level integration tests (§8 end-to-end scenarios) exercising
//! the local HTTP surface (§4.K) through the real `axum::Router` returned by
//! `imagebridge_daemon::routes::build_router`, the same router `main.rs`
//! serves. No network adapter (tunnel, control plane, backend, progress
//! websocket) is ever started here — these tests only drive request
//! handling and the pure graph-rewrite it delegates to.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use imagebridge_adapters::backend::BackendClient;
use imagebridge_adapters::control_plane::ControlPlaneClient;
use imagebridge_adapters::download::Downloader;
use imagebridge_adapters::model_registry::ModelRegistryClient;
use imagebridge_adapters::plugins::PluginInstaller;
use imagebridge_adapters::progress::ProgressSubscriber;
use imagebridge_adapters::tunnel::TunnelSupervisor;
use imagebridge_core::deps::critical::CriticalPackages;
use imagebridge_core::workflow::catalog::StaticCatalog;
use imagebridge_core::{AgentConfig, SystemClock};
use imagebridge_daemon::routes::build_router;
use imagebridge_daemon::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

/// Builds an `AppState` over a throwaway backend install directory, with no
/// background services started (§4.N's bootstrap/start-services split
/// exists exactly so tests can do this).
fn test_state(install_dir: &std::path::Path) -> AppState {
    let mut config = AgentConfig::from_env();
    config.backend_install_dir = install_dir.to_path_buf();
    config.machine_identity = None;
    let config = Arc::new(config);

    let control_plane = ControlPlaneClient::new(Arc::clone(&config));
    let tunnel = TunnelSupervisor::new(config.tunnel_binary.clone(), config.local_http_port);
    let downloader = Downloader::new(&config, SystemClock);
    let progress = ProgressSubscriber::new();
    let backend = BackendClient::new(config.backend_base_url.clone());
    let plugins = PluginInstaller::new(config.custom_nodes_dir(), CriticalPackages::default());
    let models = ModelRegistryClient::new(&config);
    let http = reqwest::Client::new();

    AppState::new(config, control_plane, tunnel, downloader, progress, backend, plugins, models, http, StaticCatalog::default())
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// E1: a `PrimitiveNode` feeding a connected widget input inlines its value
/// and the primitive node itself is dropped from the output.
#[tokio::test]
async fn e1_primitive_node_inlines_into_downstream_widget() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));

    let body = json!({
        "nodes": [
            {"id": 1, "type": "PrimitiveNode", "widgets_values": [0.75]},
            {"id": 2, "type": "KSampler", "mode": 0, "inputs": [{"name": "denoise", "link": 10}]}
        ],
        "links": [[10, 1, 0, 2, 0, "FLOAT"]]
    });

    let response = app
        .oneshot(Request::post("/workflow/convert").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = body_json(response).await;
    assert_eq!(
        result,
        json!({"2": {"class_type": "KSampler", "inputs": {"denoise": 0.75}, "_meta": {"title": "KSampler"}}})
    );
}

/// E2: a `Note` node produces no output at all.
#[tokio::test]
async fn e2_note_node_produces_empty_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));

    let body = json!({"nodes": [{"id": 5, "type": "Note", "widgets_values": ["hi"]}], "links": []});

    let response = app
        .oneshot(Request::post("/workflow/convert").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({}));
}

/// Invariant 1: a workflow already in execution-format passes through
/// `normalize` unchanged, reachable end-to-end through the HTTP surface.
#[tokio::test]
async fn convert_is_idempotent_on_execution_format_input() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));

    let body = json!({"3": {"class_type": "SaveImage", "inputs": {"filename_prefix": "out"}, "_meta": {"title": "Save Image"}}});

    let response = app
        .oneshot(Request::post("/workflow/convert").header("content-type", "application/json").body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, body);
}

/// §6: missing `nodes`/`links` on a non-execution-format body is a 400.
#[tokio::test]
async fn convert_rejects_malformed_body() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));

    let response = app
        .oneshot(Request::post("/workflow/convert").header("content-type", "application/json").body(Body::from(json!({"oops": true}).to_string())).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// E5: `/api/prompt-status` with an unknown id while the subscriber has
/// never connected reports 503, not 404 — connectivity is checked first.
#[tokio::test]
async fn prompt_status_reports_503_while_subscriber_disconnected() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));

    let response = app.oneshot(Request::get("/api/prompt-status?id=nosuch").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let payload = body_json(response).await;
    assert_eq!(payload["success"], json!(false));
}

/// `/api/prompt-status` without an `id` query parameter is a 400, not a
/// panicking extractor failure.
#[tokio::test]
async fn prompt_status_requires_id_param() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));

    let response = app.oneshot(Request::get("/api/prompt-status").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

/// `/tunnel/status` reflects a never-started supervisor: no URL, not
/// running, but the configured port is always reported.
#[tokio::test]
async fn tunnel_status_reports_idle_state_before_start() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let port = state.config.local_http_port;
    let app = build_router(state);

    let response = app.oneshot(Request::get("/tunnel/status").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let payload = body_json(response).await;
    assert_eq!(payload["running"], json!(false));
    assert_eq!(payload["url"], json!(Value::Null));
    assert_eq!(payload["port"], json!(port));
}

/// `/download_tasks` starts empty; `/download_progress/<id>` on an unknown
/// id is a 404, never a panic on a missing map entry.
#[tokio::test]
async fn download_routes_start_empty_and_404_on_unknown_task() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));

    let response = app.clone().oneshot(Request::get("/download_tasks").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"tasks": []}));

    let response = app.oneshot(Request::get("/download_progress/nosuch").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

/// `POST /download_model` submits a task synchronously visible through
/// `/download_tasks` right after, before any transfer completes.
#[tokio::test]
async fn download_submit_registers_a_task_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));

    let submit_body = json!({"url": "https://example.com/f.bin", "path": "/models/a/f.bin"});
    let response = app
        .clone()
        .oneshot(Request::post("/download_model").header("content-type", "application/json").body(Body::from(submit_body.to_string())).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let submitted = body_json(response).await;
    let task_id = submitted["task_id"].as_str().unwrap().to_string();

    let response = app.oneshot(Request::get(format!("/download_progress/{task_id}")).body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// `/healthz` never depends on any adapter and always reports ok.
#[tokio::test]
async fn healthz_is_always_ok() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));
    let response = app.oneshot(Request::get("/healthz").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

/// `/api/service-status` mirrors the subscriber's `connected` flag, false
/// until `ProgressSubscriber::run` has been spawned.
#[tokio::test]
async fn service_status_reports_disconnected_before_run_is_spawned() {
    let dir = tempfile::tempdir().unwrap();
    let app = build_router(test_state(dir.path()));
    let response = app.oneshot(Request::get("/api/service-status").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"connected": false}));
}
