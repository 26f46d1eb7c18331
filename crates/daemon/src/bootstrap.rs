//! §4.N: construct every singleton, perform the initial registration, start
//! the tunnel supervisor and the progress-tracker loop. Structured logging
//! is initialized by the caller (`main.rs`) before this runs, per §4.N's
//! "logging before any other service" ordering.

use imagebridge_adapters::backend::BackendClient;
use imagebridge_adapters::control_plane::ControlPlaneClient;
use imagebridge_adapters::download::Downloader;
use imagebridge_adapters::model_registry::ModelRegistryClient;
use imagebridge_adapters::plugins::PluginInstaller;
use imagebridge_adapters::progress::ProgressSubscriber;
use imagebridge_adapters::tunnel::{TunnelSupervisor, UrlReadyCallback};
use imagebridge_adapters::{self as adapters};
use imagebridge_core::deps::critical::CriticalPackages;
use imagebridge_core::workflow::catalog::StaticCatalog;
use imagebridge_core::{AgentConfig, Clock, SystemClock};
use imagebridge_wire::control_plane::{paths, RegisterRequest};
use std::sync::Arc;

use crate::state::AppState;

/// §4.N steps 1-4: construct every singleton, fetch the initial catalog,
/// perform a best-effort initial registration (A+C), then return the
/// state. The caller is responsible for starting the tunnel, the progress
/// loop, and serving HTTP (kept out of here so tests can construct an
/// `AppState` without touching the network or spawning background tasks).
pub async fn bootstrap(config: Arc<AgentConfig>) -> AppState {
    let control_plane = ControlPlaneClient::new(Arc::clone(&config));
    let tunnel = TunnelSupervisor::new(config.tunnel_binary.clone(), config.local_http_port);
    let downloader = Downloader::new(&config, SystemClock);
    let progress = ProgressSubscriber::new();
    let backend = BackendClient::new(config.backend_base_url.clone());
    let plugins = PluginInstaller::new(config.custom_nodes_dir(), CriticalPackages::default());
    let models = ModelRegistryClient::new(&config);
    let http = reqwest::Client::new();

    let catalog = match backend.fetch_catalog().await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::warn!(error = %e, "initial /object_info fetch failed, starting with an empty catalog");
            StaticCatalog::default()
        }
    };

    AppState::new(config, control_plane, tunnel, downloader, progress, backend, plugins, models, http, catalog)
}

/// §4.N step 2: register once before the tunnel has a URL (`endpoint` is
/// empty), so the control plane already has a row for this machine even if
/// the tunnel never comes up. Best-effort: failure is logged, never fatal.
pub async fn register_initial(state: &AppState) {
    register(state, "").await;
}

/// Builds the `on_url_ready`/`on_heartbeat` tunnel callbacks. Both do the
/// same thing (§4.C + §4.A registration with the now-known endpoint); kept
/// as one helper so the one-shot and the 30s-recurring paths can't drift.
pub fn registration_callback(state: AppState) -> UrlReadyCallback {
    Arc::new(move |url: String| {
        let state = state.clone();
        Box::pin(async move {
            register(&state, &url).await;
        })
    })
}

/// `GET /api/sync-host`: force a registration call using whatever endpoint
/// the tunnel currently reports (empty string if it hasn't come up yet).
pub async fn force_register(state: &AppState) -> bool {
    let endpoint = state.tunnel.url().await.unwrap_or_default();
    register(state, &endpoint).await
}

async fn register(state: &AppState, endpoint: &str) -> bool {
    let facts = adapters::host::collect().await;
    let clock = SystemClock;
    let body = RegisterRequest {
        gpu: facts.primary_gpu_name(),
        vram: facts.total_vram_gb(),
        cpu: facts.os_arch.clone(),
        ram: facts.total_ram_gb,
        total_disk: facts.total_disk_gb(),
        available_disk: facts.available_disk_gb(),
        endpoint: endpoint.to_string(),
        timestamp: clock.epoch_ms(),
    };
    let ok = state.control_plane.post(paths::REGISTER, &body).await.is_some();
    if !ok {
        tracing::warn!(endpoint = %endpoint, "registration call failed (best-effort, not fatal)");
    }
    ok
}

/// §4.N step 3: start the tunnel with both callbacks pointed at the same
/// registration helper, then spawn the progress-tracker subscriber loop.
/// Split out from `bootstrap()` so tests can bootstrap state without
/// touching a real tunnel binary or websocket.
pub async fn start_background_services(state: &AppState) {
    let on_url_ready = registration_callback(state.clone());
    let on_heartbeat = registration_callback(state.clone());
    if !state.tunnel.start(on_url_ready, on_heartbeat).await {
        tracing::error!("tunnel failed to start; local HTTP surface still serves on its configured port");
    }

    let progress = state.progress.clone();
    let ws_url = backend_ws_url(&state.config.backend_base_url);
    let client_id = state.config.machine_identity.as_ref().map(|m| m.as_str().to_string()).unwrap_or_default();
    tokio::spawn(async move {
        progress.run(ws_url, client_id, SystemClock).await;
    });
}

fn backend_ws_url(backend_base_url: &str) -> String {
    let without_scheme = backend_base_url.trim_start_matches("http://").trim_start_matches("https://");
    format!("ws://{}/ws", without_scheme.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_swaps_http_scheme_for_ws() {
        assert_eq!(backend_ws_url("http://localhost:8188"), "ws://localhost:8188/ws");
        assert_eq!(backend_ws_url("https://backend.example.com/"), "ws://backend.example.com/ws");
    }
}
