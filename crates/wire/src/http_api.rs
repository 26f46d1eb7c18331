//! Request/response DTOs for the agent's own local HTTP surface (§4.K, §6).

use imagebridge_core::deps::DependencyResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    pub success: bool,
    pub error: String,
}

impl ApiErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self { success: false, error: error.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelStatusResponse {
    pub url: Option<String>,
    pub running: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSubmitRequest {
    pub url: String,
    pub path: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadSubmitResponse {
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTasksResponse {
    pub tasks: Vec<imagebridge_core::download::DownloadTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncNodeResult {
    pub id: String,
    /// "cloned" | "already_present" | "error"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncNodesResponse {
    pub results: Vec<SyncNodeResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncModelResult {
    pub id: String,
    pub path: String,
    pub progress: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncModelsResponse {
    pub models: Vec<SyncModelResult>,
    pub completed: usize,
    pub pending: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependenciesProcessingResponse {
    pub status: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependenciesResultBatch {
    pub results: Vec<DependencyResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunTriggerResponse {
    pub processed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptStatusResponse {
    pub id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStatusResponse {
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoUpdateOutcome {
    pub updated: bool,
    /// "cloned" | "pulled" | "up_to_date" | "reset_and_cloned"
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyInstallOutcome {
    pub attempted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// §4.M step 6: the combined self-update payload. A prerequisite failure
/// (no git, no backend install) carries `success: false` and `error` with
/// every other field absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullUpdateResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepoUpdateOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<DependencyInstallOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_directory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `POST /api/queue-prompt` (§6): the prompt may arrive as a raw JSON object
/// or as a pre-serialized string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPrompt {
    Workflow(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePromptRequest {
    pub prompt: RawPrompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePromptResponse {
    pub backend_response: serde_json::Value,
    pub rewritten_prompt: serde_json::Value,
}

/// The `/api/view?filename=...&type=...&subfolder=...` string shape is part
/// of the wire contract (§6 "Wire details that matter") — produced whenever
/// the daemon reports an output artifact back to the control plane.
pub fn view_path(filename: &str, file_type: &str, subfolder: &str) -> String {
    format!("/api/view?filename={filename}&type={file_type}&subfolder={subfolder}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_path_matches_wire_contract_shape() {
        assert_eq!(
            view_path("out.png", "output", "run1"),
            "/api/view?filename=out.png&type=output&subfolder=run1"
        );
    }

    #[test]
    fn error_body_is_always_unsuccessful() {
        let body = ApiErrorBody::new("nope");
        assert!(!body.success);
        assert_eq!(body.error, "nope");
    }
}
