//! The shared handle every route closes over (§4.K: "handlers never
//! construct their own copies of these services"). Grounded on the
//! `rootsignal-server`'s `AppState` + axum `State` extractor idiom (axum
//! itself is not the teacher's own stack; see DESIGN.md).

use imagebridge_adapters::backend::BackendClient;
use imagebridge_adapters::control_plane::ControlPlaneClient;
use imagebridge_adapters::download::Downloader;
use imagebridge_adapters::model_registry::ModelRegistryClient;
use imagebridge_adapters::plugins::PluginInstaller;
use imagebridge_adapters::progress::ProgressSubscriber;
use imagebridge_adapters::tunnel::TunnelSupervisor;
use imagebridge_core::workflow::catalog::StaticCatalog;
use imagebridge_core::{AgentConfig, SystemClock};
use parking_lot::RwLock;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgentConfig>,
    pub control_plane: ControlPlaneClient,
    pub tunnel: TunnelSupervisor,
    pub downloader: Downloader<SystemClock>,
    pub progress: ProgressSubscriber,
    pub backend: BackendClient,
    pub plugins: PluginInstaller,
    pub models: ModelRegistryClient,
    pub http: reqwest::Client,
    catalog: Arc<RwLock<StaticCatalog>>,
}

impl AppState {
    pub fn new(
        config: Arc<AgentConfig>,
        control_plane: ControlPlaneClient,
        tunnel: TunnelSupervisor,
        downloader: Downloader<SystemClock>,
        progress: ProgressSubscriber,
        backend: BackendClient,
        plugins: PluginInstaller,
        models: ModelRegistryClient,
        http: reqwest::Client,
        catalog: StaticCatalog,
    ) -> Self {
        Self {
            config,
            control_plane,
            tunnel,
            downloader,
            progress,
            backend,
            plugins,
            models,
            http,
            catalog: Arc::new(RwLock::new(catalog)),
        }
    }

    /// §4.H: the normalizer consults whatever catalog was last fetched from
    /// the backend's `/object_info`; never re-fetched mid-request.
    pub fn catalog_snapshot(&self) -> StaticCatalog {
        self.catalog.read().clone()
    }

    /// Refreshes the catalog from the backend, logging (never failing the
    /// caller) on a fetch error.
    pub async fn refresh_catalog(&self) {
        match self.backend.fetch_catalog().await {
            Ok(fresh) => *self.catalog.write() = fresh,
            Err(e) => tracing::warn!(error = %e, "catalog refresh failed, keeping previous snapshot"),
        }
    }
}
