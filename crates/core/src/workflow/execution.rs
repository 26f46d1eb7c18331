//! Execution-format workflow types (§3 ExecutionWorkflow).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionMeta {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionNode {
    pub class_type: String,
    pub inputs: IndexMap<String, Value>,
    #[serde(rename = "_meta")]
    pub meta: ExecutionMeta,
}

/// A map from stringified node id to its execution-format node.
pub type ExecutionWorkflow = IndexMap<String, ExecutionNode>;

/// Builds the `[sourceNodeIdString, sourceSlot]` connection tuple used as an
/// input value when it points at another node's output rather than a
/// literal widget value.
pub fn connection(source_id: i64, source_slot: i64) -> Value {
    serde_json::json!([source_id.to_string(), source_slot])
}

pub fn is_connection(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|arr| arr.len() == 2 && arr[0].is_string() && arr[1].is_number())
}

/// Heuristic used by the idempotence check: a JSON value "looks like"
/// execution format if every top-level value is an object carrying a
/// `class_type` string field.
pub fn looks_like_execution_format(value: &Value) -> bool {
    let Some(obj) = value.as_object() else { return false };
    if obj.is_empty() {
        return false;
    }
    obj.values().all(|node| {
        node.as_object()
            .is_some_and(|n| n.get("class_type").is_some_and(Value::is_string))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_tuple_shape() {
        let v = connection(7, 0);
        assert_eq!(v, serde_json::json!(["7", 0]));
        assert!(is_connection(&v));
    }

    #[test]
    fn plain_values_are_not_connections() {
        assert!(!is_connection(&serde_json::json!(0.75)));
        assert!(!is_connection(&serde_json::json!(["a", "b", "c"])));
    }

    #[test]
    fn detects_execution_format_shape() {
        let exec = serde_json::json!({
            "2": {"class_type": "KSampler", "inputs": {}, "_meta": {"title": "KSampler"}}
        });
        assert!(looks_like_execution_format(&exec));
    }

    #[test]
    fn editor_format_is_not_mistaken_for_execution_format() {
        let editor = serde_json::json!({"nodes": [], "links": []});
        assert!(!looks_like_execution_format(&editor));
    }

    #[test]
    fn empty_object_is_not_execution_format() {
        assert!(!looks_like_execution_format(&serde_json::json!({})));
    }
}
