//! Desired-state record shapes handed down by the control plane (§3).

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Model,
    CustomNode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    File,
    Folder,
    Repo,
}

/// An unrecognized `model_type` string is treated as absent rather than a
/// deserialize failure (original `dependencies.py:78-80`: warn and fall
/// back to `model_type = None`, then proceed with the default repo
/// download) — never reject the whole item over one unknown enum value.
fn deserialize_lenient_model_type<'de, D>(deserializer: D) -> Result<Option<ModelType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| match s.as_str() {
        "file" => Some(ModelType::File),
        "folder" => Some(ModelType::Folder),
        "repo" => Some(ModelType::Repo),
        _ => None,
    }))
}

/// Mixed model/plugin desired-state item as returned from
/// `api/machines/dependencies` (§4.L).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyItem {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub url: Option<String>,
    pub model_repo_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_lenient_model_type")]
    pub model_type: Option<ModelType>,
    pub model_local_dir: Option<String>,
    pub model_allow_patterns: Option<Vec<String>>,
    pub name: Option<String>,
}

impl DependencyItem {
    /// §7 schema validation: a model item without `model_repo_id`, or a
    /// custom_node item without `url`, is invalid and should be skipped
    /// with a descriptive result row rather than aborting the whole sync.
    pub fn validate(&self) -> Result<(), String> {
        match self.item_type {
            ItemType::Model if self.model_repo_id.is_none() => {
                Err(format!("dependency item {} is missing model_repo_id", self.id))
            }
            ItemType::CustomNode if self.url.is_none() => {
                Err(format!("dependency item {} is missing url", self.id))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelItem {
    pub id: String,
    pub url: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginItem {
    pub id: String,
    pub url: String,
}

/// One outcome row posted back per `DependencyItem` (§3 DependencyResult).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyResult {
    pub id: String,
    pub msg: String,
}

impl DependencyResult {
    pub fn ok(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { id: id.into(), msg: msg.into() }
    }

    pub fn failed(id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { id: id.into(), msg: msg.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_item_without_repo_id_is_invalid() {
        let item = DependencyItem {
            id: "d1".into(),
            item_type: ItemType::Model,
            url: None,
            model_repo_id: None,
            model_type: None,
            model_local_dir: None,
            model_allow_patterns: None,
            name: None,
        };
        assert!(item.validate().is_err());
    }

    #[test]
    fn custom_node_without_url_is_invalid() {
        let item = DependencyItem {
            id: "d2".into(),
            item_type: ItemType::CustomNode,
            url: None,
            model_repo_id: None,
            model_type: None,
            model_local_dir: None,
            model_allow_patterns: None,
            name: None,
        };
        assert!(item.validate().is_err());
    }

    #[test]
    fn valid_items_pass() {
        let model = DependencyItem {
            id: "d3".into(),
            item_type: ItemType::Model,
            url: None,
            model_repo_id: Some("org/repo".into()),
            model_type: Some(ModelType::File),
            model_local_dir: None,
            model_allow_patterns: None,
            name: None,
        };
        assert!(model.validate().is_ok());
    }

    #[test]
    fn unrecognized_model_type_deserializes_to_none_not_an_error() {
        let raw = serde_json::json!({
            "id": "d4",
            "type": "model",
            "model_repo_id": "org/repo",
            "model_type": "checkpoint_bundle",
        });
        let item: DependencyItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.model_type, None);
    }

    #[test]
    fn known_model_type_still_deserializes() {
        let raw = serde_json::json!({
            "id": "d5",
            "type": "model",
            "model_repo_id": "org/repo",
            "model_type": "folder",
        });
        let item: DependencyItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.model_type, Some(ModelType::Folder));
    }
}
