//! `/api/prompt-status`, `/api/prompt-status/all`, `/api/service-status`,
//! `/healthz` (§4.G, §6).

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use imagebridge_core::progress::ProgressEntry;
use imagebridge_wire::http_api::{PromptStatusResponse, ServiceStatusResponse};
use serde_json::Value;
use std::collections::HashMap;

use crate::routes::support::{api_error, ok_json};
use crate::state::AppState;

/// `GET /api/prompt-status?id=<jobId>` (§6): progress map, then backend
/// history, then backend queue, in that order; 503 while the subscriber is
/// disconnected, 404 if the id is unknown everywhere.
pub async fn prompt_status(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let Some(id) = params.get("id").cloned() else {
        return api_error(StatusCode::BAD_REQUEST, "missing 'id' query parameter");
    };

    if !state.progress.connected() {
        return api_error(StatusCode::SERVICE_UNAVAILABLE, "progress subscriber not connected");
    }

    if let Some(entry) = state.progress.get(&id) {
        return ok_json(from_progress_entry(id, &entry));
    }

    if let Ok(Some(history)) = state.backend.history(&id).await {
        let status = history.status.unwrap_or_else(|| "unknown".to_string());
        return ok_json(PromptStatusResponse {
            id,
            status,
            progress: None,
            node: None,
            outputs: Some(history.output_files),
            error: history.error_message,
        });
    }

    if let Ok(queue) = state.backend.queue().await {
        if queue_contains(&queue, &id) {
            return ok_json(PromptStatusResponse {
                id,
                status: "queued".to_string(),
                progress: None,
                node: None,
                outputs: None,
                error: None,
            });
        }
    }

    api_error(StatusCode::NOT_FOUND, format!("unknown job id: {id}"))
}

fn from_progress_entry(id: String, entry: &ProgressEntry) -> PromptStatusResponse {
    let status = match entry.status {
        imagebridge_core::progress::ProgressStatus::Running => "running",
        imagebridge_core::progress::ProgressStatus::Completed => "completed",
        imagebridge_core::progress::ProgressStatus::Error => "error",
    };
    PromptStatusResponse {
        id,
        status: status.to_string(),
        progress: Some(entry.percent),
        node: entry.node.clone(),
        outputs: None,
        error: entry.error.clone(),
    }
}

fn queue_contains(queue: &Value, id: &str) -> bool {
    for key in ["queue_running", "queue_pending"] {
        let Some(entries) = queue.get(key).and_then(Value::as_array) else { continue };
        if entries.iter().any(|entry| entry.get(1).and_then(Value::as_str) == Some(id)) {
            return true;
        }
    }
    false
}

/// `GET /api/prompt-status/all` (§6).
pub async fn prompt_status_all(State(state): State<AppState>) -> Response {
    ok_json(state.progress.all())
}

/// `GET /api/service-status` (§6).
pub async fn service_status(State(state): State<AppState>) -> Response {
    ok_json(ServiceStatusResponse { connected: state.progress.connected() })
}

/// `GET /healthz` (§6): liveness only, no external checks.
pub async fn healthz() -> &'static str {
    "ok"
}
