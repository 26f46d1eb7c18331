//! `GET|POST /api/pull-update` (§4.M, §6).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use imagebridge_engine::self_updater;

use crate::routes::support::ok_json;
use crate::state::AppState;

pub async fn pull_update(State(state): State<AppState>) -> Response {
    let custom_nodes_dir = state.config.custom_nodes_dir();
    let response = self_updater::pull_update(&custom_nodes_dir, "pip").await;
    if response.success {
        ok_json(response)
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(response)).into_response()
    }
}

use axum::response::IntoResponse;
