//! `/workflow/convert`, `/api/workflow-run`, and `/api/queue-prompt` (§4.H,
//! §4.I, §4.J, §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use imagebridge_core::workflow::execution::looks_like_execution_format;
use imagebridge_core::workflow::normalize;
use imagebridge_wire::http_api::{QueuePromptRequest, QueuePromptResponse, RawPrompt, WorkflowRunTriggerResponse};
use serde_json::Value;

use crate::routes::support::{api_error, ok_json, pretty_json};
use crate::state::AppState;

pub async fn convert_info() -> &'static str {
    "POST a workflow (editor or execution format) as the request body to normalize it to execution format."
}

/// `POST /workflow/convert` (§4.H, §6): 400 on a body missing `nodes`/
/// `links` unless it already looks like execution format (invariant 1).
pub async fn convert(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    if !looks_like_execution_format(&body) && (body.get("nodes").is_none() || body.get("links").is_none()) {
        return api_error(StatusCode::BAD_REQUEST, "request body is missing 'nodes' or 'links'");
    }

    let catalog = state.catalog_snapshot();
    match normalize(&body, &catalog) {
        Ok(result) => pretty_json(result),
        Err(e) => api_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

/// `GET|POST /api/workflow-run` (§4.J, §6).
pub async fn run_pending(State(state): State<AppState>) -> Response {
    let input_dir = state.config.input_dir();
    let (processed, failed) =
        imagebridge_engine::job_orchestrator::run_pending_workflows(&state.control_plane, &state.backend, &state.http, &input_dir)
            .await;
    ok_json(WorkflowRunTriggerResponse { processed, failed })
}

/// `POST /api/queue-prompt` (§6): §4.I input rewrite, §4.H normalize, then
/// forward verbatim to the backend's own `/prompt` endpoint.
pub async fn queue_prompt(State(state): State<AppState>, Json(req): Json<QueuePromptRequest>) -> Response {
    let mut prompt = match req.prompt {
        RawPrompt::Workflow(value) => value,
        RawPrompt::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(e) => return api_error(StatusCode::BAD_REQUEST, format!("prompt is not valid JSON: {e}")),
        },
    };

    let input_dir = state.config.input_dir();
    imagebridge_engine::input_rewriter::rewrite_external_inputs(&mut prompt, &state.http, &input_dir).await;

    let catalog = state.catalog_snapshot();
    let rewritten_prompt = match normalize(&prompt, &catalog) {
        Ok(result) => result,
        Err(e) => return api_error(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match state.backend.submit_prompt_raw(&rewritten_prompt).await {
        Ok(backend_response) => ok_json(QueuePromptResponse { backend_response, rewritten_prompt }),
        Err(e) => api_error(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}
