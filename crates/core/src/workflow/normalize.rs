//! The graph rewrite itself (§4.H). Structured as a sequence of passes over
//! an intermediate representation rather than a single walk, per §9: build
//! the link index and classify nodes first, then resolve connections
//! (tracing through bypassed nodes and inlining primitives), then assemble
//! each surviving node's `inputs` map in catalog order.

use super::catalog::NodeClassCatalog;
use super::editor::{EditorLink, EditorNode, EditorWorkflow, WidgetsValues, MODE_BYPASSED, MODE_MUTED};
use super::execution::{connection, looks_like_execution_format, ExecutionMeta, ExecutionNode, ExecutionWorkflow};
use crate::error::{CoreError, CoreResult};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const CONTROL_VALUES: &[&str] = &["fixed", "increment", "decrement", "randomize"];
const SKIPPED_WIDGET_MAP_KEYS: &[&str] = &["videopreview", "preview"];

/// Top-level entry point used by `POST /workflow/convert` and the input
/// rewriter: accepts either shape and always returns execution format.
pub fn normalize(input: &Value, catalog: &dyn NodeClassCatalog) -> CoreResult<Value> {
    if looks_like_execution_format(input) {
        return Ok(input.clone());
    }
    let workflow: EditorWorkflow = serde_json::from_value(input.clone())
        .map_err(|e| CoreError::Validation(format!("not a valid editor workflow: {e}")))?;
    let execution = normalize_editor(&workflow, catalog);
    serde_json::to_value(execution).map_err(CoreError::from)
}

enum SourceResolution {
    Connection(i64, i64),
    Primitive(Value),
    Unresolved,
}

struct LinkIndex(HashMap<i64, EditorLink>);

impl LinkIndex {
    fn build(links: &[EditorLink]) -> Self {
        Self(links.iter().map(|l| (l.id, l.clone())).collect())
    }

    fn get(&self, id: i64) -> Option<&EditorLink> {
        self.0.get(&id)
    }
}

/// Follows a link to its ultimate source, transparently stitching through
/// any chain of bypassed nodes (§4.H "Trace-through-bypass", §8 invariant
/// 12 — a cycle of bypassed nodes must not loop).
fn trace_source(
    link_id: i64,
    links: &LinkIndex,
    nodes_by_id: &HashMap<i64, &EditorNode>,
    bypass_set: &HashSet<i64>,
) -> Option<(i64, i64)> {
    let link = links.get(link_id)?;
    let mut node_id = link.source_node;
    let mut slot = link.source_slot;
    let mut visited = HashSet::new();

    while bypass_set.contains(&node_id) {
        if !visited.insert(node_id) {
            return None; // cycle of bypassed nodes
        }
        let bypassed = nodes_by_id.get(&node_id)?;
        let first_link = bypassed.inputs.first().and_then(|i| i.link);
        match first_link {
            Some(next_link_id) => {
                let next = links.get(next_link_id)?;
                node_id = next.source_node;
                slot = next.source_slot;
            }
            None => return None,
        }
    }
    Some((node_id, slot))
}

fn resolve_input_link(
    link_id: i64,
    links: &LinkIndex,
    nodes_by_id: &HashMap<i64, &EditorNode>,
    bypass_set: &HashSet<i64>,
    primitive_values: &HashMap<i64, Value>,
) -> SourceResolution {
    match trace_source(link_id, links, nodes_by_id, bypass_set) {
        Some((node_id, _slot)) if primitive_values.contains_key(&node_id) => {
            SourceResolution::Primitive(primitive_values[&node_id].clone())
        }
        Some((node_id, slot)) => SourceResolution::Connection(node_id, slot),
        None => {
            // Dead end (e.g. a bypassed node with nothing upstream). Preserve
            // the link's own declared source as a best-effort connection so
            // downstream validation — not this rewrite — catches it.
            match links.get(link_id) {
                Some(l) => SourceResolution::Connection(l.source_node, l.source_slot),
                None => SourceResolution::Unresolved,
            }
        }
    }
}

fn primitive_value(node: &EditorNode) -> Value {
    match &node.widgets_values {
        WidgetsValues::List(list) => list.first().cloned().unwrap_or(Value::Null),
        WidgetsValues::Map(map) => map.values().next().cloned().unwrap_or(Value::Null),
    }
}

pub fn normalize_editor(workflow: &EditorWorkflow, catalog: &dyn NodeClassCatalog) -> ExecutionWorkflow {
    let links = LinkIndex::build(&workflow.links);
    let nodes_by_id: HashMap<i64, &EditorNode> = workflow.nodes.iter().map(|n| (n.id, n)).collect();

    let mut bypass_set: HashSet<i64> = HashSet::new();
    let mut primitive_values: HashMap<i64, Value> = HashMap::new();
    let mut candidates: Vec<&EditorNode> = Vec::new();

    for node in &workflow.nodes {
        if node.mode == MODE_MUTED {
            continue;
        }
        if node.mode == MODE_BYPASSED {
            bypass_set.insert(node.id);
            continue;
        }
        match node.node_type.as_str() {
            "PrimitiveNode" => {
                primitive_values.insert(node.id, primitive_value(node));
            }
            "Note" => {}
            "LoadImageOutput" => {}
            _ => candidates.push(node),
        }
    }

    let surviving: Vec<&EditorNode> = candidates
        .into_iter()
        .filter(|node| {
            if node.has_connected_output() {
                return true;
            }
            match catalog.lookup(&node.node_type) {
                Some(meta) => meta.is_output_node,
                // Unknown metadata: never exclude on this rule alone.
                None => true,
            }
        })
        .collect();

    let mut result: ExecutionWorkflow = IndexMap::new();
    for node in surviving {
        let meta = catalog.lookup(&node.node_type);
        let title = node
            .title
            .clone()
            .or_else(|| meta.and_then(|m| m.display_name.clone()))
            .unwrap_or_else(|| node.node_type.clone());

        let mut link_inputs: IndexMap<String, Value> = IndexMap::new();
        let mut primitive_inputs: IndexMap<String, Value> = IndexMap::new();

        for input in &node.inputs {
            let Some(link_id) = input.link else { continue };
            match resolve_input_link(link_id, &links, &nodes_by_id, &bypass_set, &primitive_values) {
                SourceResolution::Connection(src, slot) => {
                    link_inputs.insert(input.name.clone(), connection(src, slot));
                }
                SourceResolution::Primitive(value) => {
                    primitive_inputs.insert(input.name.clone(), value);
                }
                SourceResolution::Unresolved => {}
            }
        }

        let mut widget_inputs = widget_values_for(node, meta, &link_inputs);

        let inputs = assemble_inputs(meta, &mut widget_inputs, &mut primitive_inputs, &mut link_inputs);

        result.insert(
            node.id.to_string(),
            ExecutionNode {
                class_type: node.node_type.clone(),
                inputs,
                meta: ExecutionMeta { title },
            },
        );
    }

    result
}

fn widget_values_for(
    node: &EditorNode,
    meta: Option<&super::catalog::NodeClassMeta>,
    link_inputs: &IndexMap<String, Value>,
) -> IndexMap<String, Value> {
    let mut widget_inputs = IndexMap::new();

    match &node.widgets_values {
        WidgetsValues::Map(map) => {
            for (key, value) in map {
                if SKIPPED_WIDGET_MAP_KEYS.contains(&key.as_str()) {
                    continue;
                }
                if link_inputs.contains_key(key) {
                    continue;
                }
                widget_inputs.insert(key.clone(), value.clone());
            }
        }
        WidgetsValues::List(list) => {
            let has_self_describing = list
                .iter()
                .any(|v| v.as_object().is_some_and(|o| o.contains_key("type")));

            if has_self_describing {
                let mut lora_counter = 0u32;
                let mut add_row_counter = 0u32;
                for value in list {
                    if let Some(s) = value.as_str() {
                        if s.is_empty() {
                            widget_inputs
                                .insert(format!("_add_row_{add_row_counter}"), Value::String(String::new()));
                            add_row_counter += 1;
                        }
                        continue;
                    }
                    let Some(obj) = value.as_object() else { continue };
                    let mut cleaned = obj.clone();
                    if cleaned.get("strengthTwo").is_some_and(Value::is_null) {
                        cleaned.remove("strengthTwo");
                    }
                    let key = if cleaned.contains_key("lora") {
                        lora_counter += 1;
                        format!("lora_{lora_counter}")
                    } else if let Some(t) = obj.get("type").and_then(Value::as_str) {
                        t.to_string()
                    } else {
                        continue; // no usable name, best-effort drop
                    };
                    widget_inputs.insert(key, Value::Object(cleaned));
                }
            } else {
                let filtered: Vec<&Value> = list
                    .iter()
                    .filter(|v| !v.as_str().is_some_and(|s| CONTROL_VALUES.contains(&s)))
                    .collect();

                let widget_names: Vec<String> = match meta {
                    Some(m) => m.widget_only_names(),
                    None => (0..filtered.len()).map(|i| format!("widget_{i}")).collect(),
                };

                for (name, value) in widget_names.iter().zip(filtered.iter()) {
                    if link_inputs.contains_key(name) {
                        continue;
                    }
                    widget_inputs.insert(name.clone(), (*value).clone());
                }
            }
        }
    }

    widget_inputs
}

/// §4.H "Ordering of the emitted inputs map".
fn assemble_inputs(
    meta: Option<&super::catalog::NodeClassMeta>,
    widget_inputs: &mut IndexMap<String, Value>,
    primitive_inputs: &mut IndexMap<String, Value>,
    link_inputs: &mut IndexMap<String, Value>,
) -> IndexMap<String, Value> {
    let mut inputs = IndexMap::new();

    if let Some(meta) = meta {
        let order: Vec<String> = meta.inputs_order.keys().cloned().collect();
        for name in &order {
            if let Some(v) = widget_inputs.shift_remove(name) {
                inputs.insert(name.clone(), v);
            } else if let Some(v) = primitive_inputs.shift_remove(name) {
                inputs.insert(name.clone(), v);
            }
        }
        for name in &order {
            if let Some(v) = link_inputs.shift_remove(name) {
                inputs.insert(name.clone(), v);
            }
        }
    }

    for (k, v) in widget_inputs.drain(..) {
        inputs.insert(k, v);
    }
    for (k, v) in primitive_inputs.drain(..) {
        inputs.insert(k, v);
    }
    for (k, v) in link_inputs.drain(..) {
        inputs.insert(k, v);
    }

    inputs
}

#[cfg(test)]
#[path = "normalize_tests.rs"]
mod tests;
