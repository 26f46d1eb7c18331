//! The attached generative backend's HTTP surface (seams for H/I/J/K):
//! node-class catalog for the normalizer, prompt submission, history and
//! queue polling, and the best-effort cache-refresh ping already used by
//! `download.rs`.

use imagebridge_core::workflow::catalog::{InputKind, NodeClassMeta, StaticCatalog};
use indexmap::IndexMap;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("non-2xx response: {0}")]
    Status(u16),
}

#[derive(Debug, Clone)]
pub struct HistoryOutcome {
    pub started_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub status: Option<String>,
    pub error_message: Option<String>,
    pub output_files: Vec<String>,
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    /// §4.H "Node-class metadata": one `/object_info` fetch populating a
    /// [`StaticCatalog`] the normalizer consults for the rest of the run.
    pub async fn fetch_catalog(&self) -> Result<StaticCatalog, BackendError> {
        let resp = self
            .http
            .get(self.url("object_info"))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        let body: Value = resp.json().await.map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(parse_object_info(&body))
    }

    /// §4.J step 2: submit an execution-format prompt. Returns the backend's
    /// assigned job id on 2xx.
    pub async fn submit_prompt(&self, prompt: &Value) -> Result<String, BackendError> {
        let resp = self
            .http
            .post(self.url("api/prompt"))
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        let body: Value = resp.json().await.map_err(|e| BackendError::Transport(e.to_string()))?;
        body["prompt_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| BackendError::Transport("backend response missing prompt_id".to_string()))
    }

    /// Raw passthrough for `POST /api/queue-prompt` (§6): return the
    /// backend's response verbatim alongside the rewritten prompt.
    pub async fn submit_prompt_raw(&self, prompt: &Value) -> Result<Value, BackendError> {
        let resp = self
            .http
            .post(self.url("api/prompt"))
            .json(&serde_json::json!({ "prompt": prompt }))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        resp.json().await.map_err(|e| BackendError::Transport(e.to_string()))
    }

    /// §4.J step 5 / §9: parses `status.messages` as `[kind, data]` tuples,
    /// honoring only `execution_start`/`execution_success`/`execution_error`.
    pub async fn history(&self, job_id: &str) -> Result<Option<HistoryOutcome>, BackendError> {
        let resp = self
            .http
            .get(self.url(&format!("history/{job_id}")))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        let body: Value = resp.json().await.map_err(|e| BackendError::Transport(e.to_string()))?;
        let Some(entry) = body.get(job_id) else { return Ok(None) };
        Ok(Some(parse_history_entry(entry)))
    }

    pub async fn queue(&self) -> Result<Value, BackendError> {
        let resp = self
            .http
            .get(self.url("queue"))
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(BackendError::Status(resp.status().as_u16()));
        }
        resp.json().await.map_err(|e| BackendError::Transport(e.to_string()))
    }
}

fn parse_object_info(body: &Value) -> StaticCatalog {
    let Some(map) = body.as_object() else { return StaticCatalog::default() };
    let mut catalog = IndexMap::new();
    for (node_type, def) in map {
        catalog.insert(node_type.clone(), parse_node_class(def));
    }
    StaticCatalog(catalog)
}

fn parse_node_class(def: &Value) -> NodeClassMeta {
    let mut inputs_order = IndexMap::new();
    if let Some(input) = def.get("input") {
        for section in ["required", "optional"] {
            let Some(fields) = input.get(section).and_then(Value::as_object) else { continue };
            for (name, spec) in fields {
                inputs_order.insert(name.clone(), classify_input(spec));
            }
        }
    }
    NodeClassMeta {
        inputs_order,
        is_output_node: def.get("output_node").and_then(Value::as_bool).unwrap_or(false),
        display_name: def.get("display_name").and_then(Value::as_str).map(str::to_string),
    }
}

/// `INPUT_TYPES` entries are `[typeSpec, options?]`. A list `typeSpec` is a
/// choice widget; a known scalar name is `Scalar`; anything else lower-case
/// is a custom widget; everything else is a connection type.
fn classify_input(spec: &Value) -> InputKind {
    let Some(arr) = spec.as_array() else { return InputKind::Connection };
    let Some(type_spec) = arr.first() else { return InputKind::Connection };

    if let Some(choices) = type_spec.as_array() {
        let values = choices.iter().filter_map(Value::as_str).map(str::to_string).collect();
        return InputKind::Choice(values);
    }

    match type_spec.as_str() {
        Some("INT") | Some("FLOAT") | Some("STRING") | Some("BOOLEAN") => InputKind::Scalar,
        Some(name) if name.chars().next().is_some_and(|c| c.is_lowercase()) => {
            InputKind::CustomWidget(name.to_string())
        }
        _ => InputKind::Connection,
    }
}

fn parse_history_entry(entry: &Value) -> HistoryOutcome {
    let mut outcome = HistoryOutcome {
        started_at_ms: None,
        completed_at_ms: None,
        status: None,
        error_message: None,
        output_files: Vec::new(),
    };

    if let Some(messages) = entry["status"]["messages"].as_array() {
        for message in messages {
            let Some(pair) = message.as_array() else { continue };
            let (Some(kind), Some(data)) = (pair.first().and_then(Value::as_str), pair.get(1)) else {
                continue;
            };
            match kind {
                "execution_start" => {
                    outcome.started_at_ms = data["timestamp"].as_u64();
                    outcome.status = Some("running".to_string());
                }
                "execution_success" => {
                    outcome.completed_at_ms = data["timestamp"].as_u64();
                    outcome.status = Some("completed".to_string());
                }
                "execution_error" => {
                    outcome.completed_at_ms = data["timestamp"].as_u64();
                    outcome.status = Some("error".to_string());
                    outcome.error_message =
                        data["exception_message"].as_str().map(str::to_string);
                }
                _ => {}
            }
        }
    }

    if let Some(outputs) = entry["outputs"].as_object() {
        for node_output in outputs.values() {
            if let Some(images) = node_output["images"].as_array() {
                for image in images {
                    let (Some(filename), Some(file_type)) =
                        (image["filename"].as_str(), image["type"].as_str())
                    else {
                        continue;
                    };
                    let subfolder = image["subfolder"].as_str().unwrap_or("");
                    outcome.output_files.push(imagebridge_wire::http_api::view_path(
                        filename, file_type, subfolder,
                    ));
                }
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_input_recognizes_choice_list() {
        let spec = serde_json::json!([["euler", "dpm"]]);
        assert_eq!(classify_input(&spec), InputKind::Choice(vec!["euler".into(), "dpm".into()]));
    }

    #[test]
    fn classify_input_recognizes_scalar_types() {
        assert_eq!(classify_input(&serde_json::json!(["INT", {}])), InputKind::Scalar);
        assert_eq!(classify_input(&serde_json::json!(["FLOAT", {}])), InputKind::Scalar);
    }

    #[test]
    fn classify_input_recognizes_connection_type() {
        assert_eq!(classify_input(&serde_json::json!(["MODEL"])), InputKind::Connection);
    }

    #[test]
    fn classify_input_recognizes_lowercase_custom_widget() {
        assert_eq!(
            classify_input(&serde_json::json!(["combo_custom", {}])),
            InputKind::CustomWidget("combo_custom".to_string())
        );
    }

    #[test]
    fn parse_object_info_builds_catalog_entries() {
        let body = serde_json::json!({
            "KSampler": {
                "input": { "required": { "seed": ["INT", {}], "model": ["MODEL"] } },
                "output_node": false,
            },
            "SaveImage": {
                "input": { "required": { "images": ["IMAGE"] } },
                "output_node": true,
            }
        });
        let catalog = parse_object_info(&body);
        assert!(!catalog.0.get("KSampler").unwrap().is_output_node);
        assert!(catalog.0.get("SaveImage").unwrap().is_output_node);
    }

    #[test]
    fn parse_history_entry_extracts_terminal_status_and_outputs() {
        let entry = serde_json::json!({
            "status": { "messages": [
                ["execution_start", {"timestamp": 1}],
                ["execution_success", {"timestamp": 2}],
            ]},
            "outputs": { "9": { "images": [
                {"filename": "out.png", "type": "output", "subfolder": ""}
            ]}}
        });
        let outcome = parse_history_entry(&entry);
        assert_eq!(outcome.status.as_deref(), Some("completed"));
        assert_eq!(outcome.started_at_ms, Some(1));
        assert_eq!(outcome.completed_at_ms, Some(2));
        assert_eq!(outcome.output_files, vec!["/api/view?filename=out.png&type=output&subfolder=".to_string()]);
    }

    #[test]
    fn parse_history_entry_ignores_unknown_message_kinds() {
        let entry = serde_json::json!({
            "status": { "messages": [["status_update", {"timestamp": 1}]] },
        });
        let outcome = parse_history_entry(&entry);
        assert!(outcome.status.is_none());
    }
}
