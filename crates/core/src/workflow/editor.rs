//! Editor-format workflow types (§3 EditorWorkflow).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MODE_ACTIVE: u8 = 0;
pub const MODE_MUTED: u8 = 2;
pub const MODE_BYPASSED: u8 = 4;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EditorInput {
    pub name: String,
    #[serde(default)]
    pub link: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EditorOutput {
    #[serde(default)]
    pub links: Option<Vec<i64>>,
}

impl EditorOutput {
    pub fn is_connected(&self) -> bool {
        self.links.as_ref().is_some_and(|l| !l.is_empty())
    }
}

/// `widgets_values` is either a positional list or a self-describing map,
/// never both — the editor emits whichever shape the node's UI widgets use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WidgetsValues {
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Default for WidgetsValues {
    fn default() -> Self {
        WidgetsValues::List(Vec::new())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorNode {
    pub id: i64,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub mode: u8,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub inputs: Vec<EditorInput>,
    #[serde(default)]
    pub outputs: Vec<EditorOutput>,
    #[serde(default)]
    pub widgets_values: WidgetsValues,
    #[serde(default)]
    pub properties: Option<Value>,
}

impl EditorNode {
    pub fn has_connected_output(&self) -> bool {
        self.outputs.iter().any(EditorOutput::is_connected)
    }
}

type LinkTuple = (i64, i64, i64, i64, i64, String);

/// One entry of the flat `links` array: `[linkId, sourceNodeId,
/// sourceSlot, targetNodeId, targetSlot, dataType]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "LinkTuple", into = "LinkTuple")]
pub struct EditorLink {
    pub id: i64,
    pub source_node: i64,
    pub source_slot: i64,
    pub target_node: i64,
    pub target_slot: i64,
    pub data_type: String,
}

impl From<LinkTuple> for EditorLink {
    fn from(t: LinkTuple) -> Self {
        Self {
            id: t.0,
            source_node: t.1,
            source_slot: t.2,
            target_node: t.3,
            target_slot: t.4,
            data_type: t.5,
        }
    }
}

impl From<EditorLink> for LinkTuple {
    fn from(l: EditorLink) -> Self {
        (l.id, l.source_node, l.source_slot, l.target_node, l.target_slot, l.data_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorWorkflow {
    pub nodes: Vec<EditorNode>,
    pub links: Vec<EditorLink>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_round_trips_through_tuple_json() {
        let json = serde_json::json!([10, 1, 0, 2, 0, "FLOAT"]);
        let link: EditorLink = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(link.id, 10);
        assert_eq!(link.source_node, 1);
        assert_eq!(link.data_type, "FLOAT");
        let back = serde_json::to_value(&link).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn widgets_values_parses_list_or_map() {
        let list: WidgetsValues = serde_json::from_value(serde_json::json!([1, "a"])).unwrap();
        assert!(matches!(list, WidgetsValues::List(_)));
        let map: WidgetsValues =
            serde_json::from_value(serde_json::json!({"seed": 1})).unwrap();
        assert!(matches!(map, WidgetsValues::Map(_)));
    }
}
