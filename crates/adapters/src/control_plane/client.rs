//! A thin authenticated JSON client to the control plane (§4.A).
//!
//! `get`/`post` return `None` on any transport error, non-2xx status, or
//! absent machine identity — each case is logged, never retried here.
//! Retry policy, when wanted, belongs to the caller (the sync engine).

use imagebridge_core::AgentConfig;
use imagebridge_wire::MACHINE_ID_HEADER;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlPlaneError {
    #[error("missing machine identity")]
    MissingIdentity,
    #[error("transport error: {0}")]
    Transport(String),
    #[error("non-2xx response: {0}")]
    Status(u16),
}

#[derive(Clone)]
pub struct ControlPlaneClient {
    http: reqwest::Client,
    config: Arc<AgentConfig>,
}

impl ControlPlaneClient {
    pub fn new(config: Arc<AgentConfig>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, config }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.control_plane_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn machine_id(&self) -> Result<&str, ControlPlaneError> {
        self.config
            .machine_identity
            .as_ref()
            .map(|id| id.as_str())
            .ok_or(ControlPlaneError::MissingIdentity)
    }

    /// `GET path` → parsed JSON, or `None` (logged) on any failure.
    pub async fn get(&self, path: &str) -> Option<Value> {
        match self.try_get(path).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(path, error = %e, "control-plane GET failed");
                None
            }
        }
    }

    /// `POST path` with a JSON body → parsed JSON, or `None` (logged).
    pub async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Option<Value> {
        match self.try_post(path, body).await {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::error!(path, error = %e, "control-plane POST failed");
                None
            }
        }
    }

    async fn try_get(&self, path: &str) -> Result<Value, ControlPlaneError> {
        let machine_id = self.machine_id()?;
        let resp = self
            .http
            .get(self.url(path))
            .header(MACHINE_ID_HEADER, machine_id)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ControlPlaneError::Status(status.as_u16()));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))
    }

    async fn try_post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Value, ControlPlaneError> {
        let machine_id = self.machine_id()?;
        let resp = self
            .http
            .post(self.url(path))
            .header(MACHINE_ID_HEADER, machine_id)
            .json(body)
            .send()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ControlPlaneError::Status(status.as_u16()));
        }
        resp.json::<Value>()
            .await
            .map_err(|e| ControlPlaneError::Transport(e.to_string()))
    }

    /// Synchronous convenience wrapper for call sites that are not already
    /// inside an async context (§4.A "offers async and sync variants").
    pub fn get_blocking(&self, path: &str) -> Option<Value> {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.get(path))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagebridge_core::identity::MachineIdentity;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(base_url: String, identity: Option<&str>) -> Arc<AgentConfig> {
        let mut cfg = AgentConfig::from_env();
        cfg.control_plane_base_url = base_url;
        cfg.machine_identity = identity.and_then(MachineIdentity::new);
        Arc::new(cfg)
    }

    #[tokio::test]
    async fn get_without_identity_returns_none() {
        let cfg = config_for("http://localhost:1".to_string(), None);
        let client = ControlPlaneClient::new(cfg);
        assert!(client.get("api/machines/models").await.is_none());
    }

    #[tokio::test]
    async fn get_injects_machine_id_header_and_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/machines/models"))
            .and(header("x-machine-id", "tok-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
            .mount(&server)
            .await;

        let cfg = config_for(server.uri(), Some("tok-123"));
        let client = ControlPlaneClient::new(cfg);
        let body = client.get("api/machines/models").await.unwrap();
        assert_eq!(body["items"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn non_2xx_status_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/machines/models"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let cfg = config_for(server.uri(), Some("tok"));
        let client = ControlPlaneClient::new(cfg);
        assert!(client.get("api/machines/models").await.is_none());
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/machines/connect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let cfg = config_for(server.uri(), Some("tok"));
        let client = ControlPlaneClient::new(cfg);
        let body = client
            .post("api/machines/connect", &serde_json::json!({"gpu": "none"}))
            .await
            .unwrap();
        assert_eq!(body["ok"], true);
    }
}
