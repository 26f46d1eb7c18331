//! `POST /download_model`, `GET /download_progress/<taskId>`,
//! `GET /download_tasks` (§4.D, §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use imagebridge_wire::http_api::{DownloadSubmitRequest, DownloadSubmitResponse, DownloadTasksResponse};

use crate::routes::support::{api_error, ok_json};
use crate::state::AppState;

pub async fn submit(State(state): State<AppState>, Json(req): Json<DownloadSubmitRequest>) -> Response {
    let task_id = state.downloader.submit(req.url, req.path, req.force);
    ok_json(DownloadSubmitResponse { task_id })
}

pub async fn progress(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    match state.downloader.task(&task_id) {
        Some(task) => ok_json(task),
        None => api_error(StatusCode::NOT_FOUND, format!("no such download task: {task_id}")),
    }
}

pub async fn tasks(State(state): State<AppState>) -> Response {
    ok_json(DownloadTasksResponse { tasks: state.downloader.all_tasks() })
}
