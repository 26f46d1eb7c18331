//! `/api/sync-host`, `/api/sync-nodes`, `/api/sync-models`, `/api/dependencies`
//! (§4.K/§4.L, §6).

use axum::extract::State;
use axum::response::Response;
use imagebridge_core::deps::{ModelItem, PluginItem};
use imagebridge_engine::dependency_reconciler::{self, SweepOutcome};
use imagebridge_engine::{model_sync, node_sync};
use imagebridge_wire::control_plane::paths;
use imagebridge_wire::http_api::{DependenciesProcessingResponse, SyncModelsResponse, SyncNodesResponse};

use crate::routes::support::{api_error, ok_json};
use crate::state::AppState;

pub async fn sync_host(State(state): State<AppState>) -> Response {
    let ok = crate::bootstrap::force_register(&state).await;
    if ok {
        ok_json(serde_json::json!({ "success": true }))
    } else {
        api_error(axum::http::StatusCode::BAD_GATEWAY, "registration call failed")
    }
}

/// `api/machines/custom_nodes` returns a bare JSON array, not an `{items:
/// […]}` wrapper (original `custom_nodes_installer.py:207`).
pub async fn sync_nodes(State(state): State<AppState>) -> Response {
    let items: Vec<PluginItem> = match state.control_plane.get(paths::CUSTOM_NODES).await {
        Some(body) => serde_json::from_value::<Vec<PluginItem>>(body).unwrap_or_default(),
        None => Vec::new(),
    };
    let results = node_sync::sync_nodes(&state.control_plane, &state.plugins, &items).await;
    ok_json(SyncNodesResponse { results })
}

/// `api/machines/models` returns a bare JSON array, not an `{items: […]}`
/// wrapper (original `model_downloader.py:555`, spec E3).
pub async fn sync_models(State(state): State<AppState>) -> Response {
    let items: Vec<ModelItem> = match state.control_plane.get(paths::MODELS).await {
        Some(body) => serde_json::from_value::<Vec<ModelItem>>(body).unwrap_or_default(),
        None => Vec::new(),
    };
    let (models, completed, pending, errors) = model_sync::sync_models(&state.downloader, &items).await;
    ok_json(SyncModelsResponse { models, completed, pending, errors })
}

/// `GET /api/dependencies` (§4.L, §6): the HTTP surface only ever sees
/// `processing` or `no_dependencies` — the sweep's own results post back to
/// the control plane out of band.
pub async fn dependencies(State(state): State<AppState>) -> Response {
    let outcome = dependency_reconciler::start_sweep(state.control_plane.clone(), state.plugins.clone(), state.models.clone()).await;
    let body = match outcome {
        SweepOutcome::NoDependencies => DependenciesProcessingResponse { status: "no_dependencies".to_string(), count: 0 },
        SweepOutcome::Started { count } => DependenciesProcessingResponse { status: "processing".to_string(), count },
    };
    ok_json(body)
}
