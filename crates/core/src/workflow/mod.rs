//! The workflow graph normalizer (§4.H) — the component that earns this
//! agent its complexity budget. Converts editor-format DAGs (nodes +
//! numbered links, with mute/bypass/primitive/widget semantics) into the
//! flat execution-format map the backend actually runs.

pub mod catalog;
pub mod editor;
pub mod execution;
pub mod normalize;

pub use catalog::{InputKind, NodeClassCatalog, NodeClassMeta};
pub use editor::{EditorInput, EditorLink, EditorNode, EditorOutput, EditorWorkflow, WidgetsValues};
pub use execution::{ExecutionMeta, ExecutionNode, ExecutionWorkflow};
pub use normalize::normalize;
