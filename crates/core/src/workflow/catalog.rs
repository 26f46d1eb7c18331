//! Node-class metadata lookup (§4.H "Node-class metadata"). The real
//! catalog is populated by querying the backend's `/object_info` endpoint
//! (an adapter concern); this module only defines the shape and the
//! widget-vs-connection classification rules the normalizer consults.

use indexmap::IndexMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    /// A literal choice list (combo box).
    Choice(Vec<String>),
    /// One of the scalar widget types: INT, FLOAT, STRING, BOOLEAN.
    Scalar,
    /// A custom widget type, referenced in lower-case by convention.
    CustomWidget(String),
    /// A regular connection type (MODEL, IMAGE, CONDITIONING, ...).
    Connection,
}

impl InputKind {
    pub fn is_widget(&self) -> bool {
        !matches!(self, InputKind::Connection)
    }
}

/// `INPUT_TYPES` for one node class, flattened to a single ordered map
/// (required entries first, then optional) since the normalizer's
/// ordering rules never need to distinguish the two once parsed.
#[derive(Debug, Clone, Default)]
pub struct NodeClassMeta {
    pub inputs_order: IndexMap<String, InputKind>,
    pub is_output_node: bool,
    pub display_name: Option<String>,
}

impl NodeClassMeta {
    pub fn widget_only_names(&self) -> Vec<String> {
        self.inputs_order
            .iter()
            .filter(|(_, kind)| kind.is_widget())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn link_only_names(&self) -> Vec<String> {
        self.inputs_order
            .iter()
            .filter(|(_, kind)| !kind.is_widget())
            .map(|(name, _)| name.clone())
            .collect()
    }
}

/// Lookup used by the normalizer. Metadata may be missing for unknown
/// types — the normalizer must still produce output (§4.H failure
/// semantics).
pub trait NodeClassCatalog {
    fn lookup(&self, node_type: &str) -> Option<&NodeClassMeta>;
}

/// A static, in-memory catalog — what the `imagebridge-adapters` backend
/// client builds once per process from `/object_info` and hands to the
/// normalizer.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog(pub IndexMap<String, NodeClassMeta>);

impl NodeClassCatalog for StaticCatalog {
    fn lookup(&self, node_type: &str) -> Option<&NodeClassMeta> {
        self.0.get(node_type)
    }
}

/// An empty catalog, used whenever no `/object_info` data is available —
/// every lookup falls back to best-effort behavior.
#[derive(Debug, Clone, Default)]
pub struct EmptyCatalog;

impl NodeClassCatalog for EmptyCatalog {
    fn lookup(&self, _node_type: &str) -> Option<&NodeClassMeta> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widget_only_names_excludes_connections() {
        let mut meta = NodeClassMeta::default();
        meta.inputs_order.insert("model".to_string(), InputKind::Connection);
        meta.inputs_order.insert("seed".to_string(), InputKind::Scalar);
        meta.inputs_order
            .insert("sampler_name".to_string(), InputKind::Choice(vec!["euler".to_string()]));
        assert_eq!(meta.widget_only_names(), vec!["seed", "sampler_name"]);
        assert_eq!(meta.link_only_names(), vec!["model"]);
    }

    #[test]
    fn empty_catalog_never_resolves() {
        let catalog = EmptyCatalog;
        assert!(catalog.lookup("KSampler").is_none());
    }
}
