//! Local HTTP surface (§4.K, §6). Wires every handler in this module's
//! submodules into the route table the endpoint table describes; each
//! submodule owns one cluster of endpoints.

pub mod downloads;
pub mod pull_update;
pub mod status;
pub mod support;
pub mod sync;
pub mod tunnel;
pub mod workflow;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full router (§6's endpoint table). Kept as a free function,
/// not a method on `AppState`, so `main.rs` and integration tests both call
/// the exact same wiring.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(status::healthz))
        .route("/workflow/convert", get(workflow::convert_info).post(workflow::convert))
        .route("/tunnel/status", get(tunnel::status))
        .route("/api/sync-host", get(sync::sync_host))
        .route("/api/sync-nodes", get(sync::sync_nodes).post(sync::sync_nodes))
        .route("/api/sync-models", get(sync::sync_models).post(sync::sync_models))
        .route("/api/dependencies", get(sync::dependencies))
        .route("/api/workflow-run", get(workflow::run_pending).post(workflow::run_pending))
        .route("/api/queue-prompt", post(workflow::queue_prompt))
        .route("/download_model", post(downloads::submit))
        .route("/download_progress/{task_id}", get(downloads::progress))
        .route("/download_tasks", get(downloads::tasks))
        .route("/api/prompt-status", get(status::prompt_status))
        .route("/api/prompt-status/all", get(status::prompt_status_all))
        .route("/api/service-status", get(status::service_status))
        .route("/api/pull-update", get(pull_update::pull_update).post(pull_update::pull_update))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
