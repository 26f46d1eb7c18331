//! Process-wide configuration resolved once at startup (§3 AgentConfig, §6
//! Configuration). Nothing re-reads the environment after [`AgentConfig::from_env`]
//! runs in the bootstrapper; every service is handed a shared `Arc<AgentConfig>`.

use crate::identity::MachineIdentity;
use std::path::PathBuf;
use std::time::Duration;

/// Concurrency and timeout constants named throughout §5 of the design.
/// Grouped here so a single struct literal documents every bound in one
/// place instead of scattering magic numbers across adapters.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_concurrent_downloads: usize,
    pub max_connections_per_host: usize,
    pub max_total_connections: usize,
    pub max_concurrent_input_downloads: usize,
    pub max_concurrent_model_checks: usize,
    pub max_download_retries: u32,

    pub tunnel_probe_timeout: Duration,
    pub backend_cache_refresh_timeout: Duration,
    pub model_hub_head_timeout: Duration,
    pub model_hub_connect_timeout: Duration,
    pub download_total_timeout: Duration,
    pub download_connect_timeout: Duration,
    pub download_read_timeout: Duration,
    pub tunnel_graceful_stop: Duration,
    pub heartbeat_interval: Duration,
    pub progress_publish_interval: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 8,
            max_connections_per_host: 5,
            max_total_connections: 20,
            max_concurrent_input_downloads: 3,
            max_concurrent_model_checks: 8,
            max_download_retries: 3,

            tunnel_probe_timeout: Duration::from_secs(10),
            backend_cache_refresh_timeout: Duration::from_secs(10),
            model_hub_head_timeout: Duration::from_secs(30),
            model_hub_connect_timeout: Duration::from_secs(10),
            download_total_timeout: Duration::from_secs(300),
            download_connect_timeout: Duration::from_secs(30),
            download_read_timeout: Duration::from_secs(60),
            tunnel_graceful_stop: Duration::from_secs(5),
            heartbeat_interval: Duration::from_secs(30),
            progress_publish_interval: Duration::from_millis(500),
        }
    }
}

/// Resolved, immutable process configuration. Constructed once in the
/// bootstrapper (`imagebridge-daemon::bootstrap`) and shared by `Arc`.
#[derive(Clone)]
pub struct AgentConfig {
    pub machine_identity: Option<MachineIdentity>,
    pub control_plane_base_url: String,
    pub backend_base_url: String,
    pub backend_port: u16,
    pub backend_install_dir: PathBuf,
    pub tunnel_binary: String,
    pub hf_home: Option<PathBuf>,
    pub local_http_port: u16,
    pub limits: Limits,
}

impl AgentConfig {
    /// Resolves configuration from environment variables and sane defaults.
    /// Never panics: absent `MACHINE_ID` just yields `machine_identity: None`,
    /// which callers in §4.A treat as a hard configuration failure at the
    /// point of use, not at startup.
    pub fn from_env() -> Self {
        let backend_port: u16 = std::env::var("BACKEND_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8188);
        let backend_host = std::env::var("BACKEND_HOST").unwrap_or_else(|_| "localhost".to_string());

        let home = dirs_home();
        let backend_name =
            std::env::var("BACKEND_NAME").unwrap_or_else(|_| "image-backend".to_string());
        let backend_install_dir = std::env::var("BACKEND_INSTALL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home.join(backend_name));

        Self {
            machine_identity: MachineIdentity::from_env(),
            control_plane_base_url: std::env::var("CONTROL_PLANE_URL")
                .unwrap_or_else(|_| "https://api.imagebridge.example.com".to_string()),
            backend_base_url: format!("http://{backend_host}:{backend_port}"),
            backend_port,
            backend_install_dir,
            tunnel_binary: std::env::var("TUNNEL_BIN")
                .unwrap_or_else(|_| "cloudflared".to_string()),
            hf_home: std::env::var("HF_HOME").ok().map(PathBuf::from),
            local_http_port: std::env::var("AGENT_HTTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8282),
            limits: Limits::default(),
        }
    }

    pub fn custom_nodes_dir(&self) -> PathBuf {
        self.backend_install_dir.join("custom_nodes")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.backend_install_dir.join("models")
    }

    pub fn models_shared_dir(&self) -> PathBuf {
        self.models_dir().join("shared")
    }

    pub fn input_dir(&self) -> PathBuf {
        self.backend_install_dir.join("input")
    }
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/root"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_match_design_bounds() {
        let l = Limits::default();
        assert_eq!(l.max_concurrent_downloads, 8);
        assert_eq!(l.max_connections_per_host, 5);
        assert_eq!(l.max_concurrent_input_downloads, 3);
        assert_eq!(l.max_download_retries, 3);
    }

    #[test]
    fn derived_paths_are_relative_to_install_dir() {
        let mut cfg = AgentConfig::from_env();
        cfg.backend_install_dir = PathBuf::from("/opt/backend");
        assert_eq!(cfg.custom_nodes_dir(), PathBuf::from("/opt/backend/custom_nodes"));
        assert_eq!(cfg.models_shared_dir(), PathBuf::from("/opt/backend/models/shared"));
        assert_eq!(cfg.input_dir(), PathBuf::from("/opt/backend/input"));
    }
}
