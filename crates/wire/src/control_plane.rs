//! Request/response DTOs for the outbound control-plane API (§6).

use imagebridge_core::deps::DependencyResult;
use serde::{Deserialize, Serialize};

/// Fixed relative paths named in §6. Kept as named constants rather than
/// formatted ad hoc so the `machines` (plural, plugin/model sync) vs.
/// `machine` (singular, workflow runs) split noted in §9 open questions
/// stays visible at the call site instead of being a typo risk.
pub mod paths {
    pub const REGISTER: &str = "api/machines/connect";
    pub const CUSTOM_NODES: &str = "api/machines/custom_nodes";
    pub const MODELS: &str = "api/machines/models";
    pub const DEPENDENCIES: &str = "api/machines/dependencies";
    pub const WORKFLOW_RUN_LIST: &str = "api/machine/workflow-run";

    pub fn workflow_run_queue(id: &str) -> String {
        format!("api/workflow-run/{id}/queue")
    }

    pub fn workflow_run_result(id: &str) -> String {
        format!("api/workflow-run/{id}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub gpu: String,
    pub vram: f64,
    pub cpu: String,
    pub ram: f64,
    pub total_disk: f64,
    pub available_disk: f64,
    pub endpoint: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomNodesAckRequest {
    pub node_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyResultsRequest {
    pub results: Vec<DependencyResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunItem {
    pub id: String,
    pub prompt: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunQueueAck {
    pub prompt_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Error,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRunResult {
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_id_header_constant_matches_contract() {
        assert_eq!(crate::MACHINE_ID_HEADER, "x-machine-id");
    }

    #[test]
    fn run_paths_use_singular_machine_noun() {
        assert_eq!(paths::WORKFLOW_RUN_LIST, "api/machine/workflow-run");
        assert_eq!(paths::workflow_run_queue("r1"), "api/workflow-run/r1/queue");
        assert_eq!(paths::workflow_run_result("r1"), "api/workflow-run/r1");
    }

    #[test]
    fn sync_paths_use_plural_machines_noun() {
        assert_eq!(paths::REGISTER, "api/machines/connect");
        assert_eq!(paths::CUSTOM_NODES, "api/machines/custom_nodes");
        assert_eq!(paths::MODELS, "api/machines/models");
        assert_eq!(paths::DEPENDENCIES, "api/machines/dependencies");
    }

    #[test]
    fn custom_nodes_ack_serializes_with_node_ids_key() {
        let ack = CustomNodesAckRequest { node_ids: vec!["n1".to_string()] };
        let value = serde_json::to_value(&ack).unwrap();
        assert_eq!(value, serde_json::json!({"node_ids": ["n1"]}));
    }
}
