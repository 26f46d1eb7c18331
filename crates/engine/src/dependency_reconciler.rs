//! The dependency reconciler (§4.L): a background sweep over the combined
//! model/plugin desired-state list, posting one [`DependencyResult`] row
//! per item when the sweep completes. Distinct from `node_sync`/`model_sync`
//! — those are the per-kind, synchronous sync endpoints; this is the mixed,
//! background one.

use imagebridge_adapters::control_plane::ControlPlaneClient;
use imagebridge_adapters::model_registry::ModelRegistryClient;
use imagebridge_adapters::plugins::PluginInstaller;
use imagebridge_core::deps::{DependencyItem, DependencyResult, ItemType, ModelType};
use imagebridge_wire::control_plane::{paths, DependencyResultsRequest};

/// Either a started sweep or the short-circuit empty case (§4.L).
pub enum SweepOutcome {
    NoDependencies,
    Started { count: usize },
}

/// §4.K `GET /api/dependencies`: fetches the list, and — unless it's empty
/// — spawns the sweep in the background and returns immediately.
pub async fn start_sweep(
    control_plane: ControlPlaneClient,
    plugins: PluginInstaller,
    models: ModelRegistryClient,
) -> SweepOutcome {
    let Some(body) = control_plane.get(paths::DEPENDENCIES).await else {
        return SweepOutcome::NoDependencies;
    };
    // `api/machines/dependencies` returns a bare JSON array (original
    // `dependencies.py:164`), not an `{items: […]}` wrapper.
    let raw_items: Vec<serde_json::Value> = body.as_array().cloned().unwrap_or_default();

    if raw_items.is_empty() {
        return SweepOutcome::NoDependencies;
    }

    let count = raw_items.len();
    tokio::spawn(async move {
        let results = process_items(&raw_items, &plugins, &models).await;
        let batch = DependencyResultsRequest { results };
        let _ = control_plane.post(paths::DEPENDENCIES, &batch).await;
    });
    SweepOutcome::Started { count }
}

/// §4.L: validates `type` before deserializing into the typed shape, since
/// a missing or unrecognized `type` must still produce a failure row rather
/// than silently drop the item.
async fn process_items(
    raw_items: &[serde_json::Value],
    plugins: &PluginInstaller,
    models: &ModelRegistryClient,
) -> Vec<DependencyResult> {
    let mut results = Vec::with_capacity(raw_items.len());
    for raw in raw_items {
        let id = raw["id"].as_str().unwrap_or("unknown").to_string();
        let Some(type_str) = raw["type"].as_str() else {
            results.push(DependencyResult::failed(&id, "missing 'type' field"));
            continue;
        };
        if type_str != "model" && type_str != "custom_node" {
            results.push(DependencyResult::failed(&id, format!("invalid type '{type_str}'")));
            continue;
        }
        match serde_json::from_value::<DependencyItem>(raw.clone()) {
            Ok(item) => match item.validate() {
                Ok(()) => results.push(process_one(&item, plugins, models).await),
                Err(msg) => results.push(DependencyResult::failed(&item.id, msg)),
            },
            Err(e) => results.push(DependencyResult::failed(&id, e.to_string())),
        }
    }
    results
}

async fn process_one(
    item: &DependencyItem,
    plugins: &PluginInstaller,
    models: &ModelRegistryClient,
) -> DependencyResult {
    match item.item_type {
        ItemType::CustomNode => {
            let Some(url) = &item.url else {
                return DependencyResult::failed(&item.id, "missing url for custom_node item");
            };
            match plugins.install(url).await {
                Ok(true) => DependencyResult::ok(&item.id, "already present"),
                Ok(false) => DependencyResult::ok(&item.id, "installed"),
                Err(e) => DependencyResult::failed(&item.id, e.to_string()),
            }
        }
        ItemType::Model => {
            let Some(repo_id) = &item.model_repo_id else {
                return DependencyResult::failed(&item.id, "missing model_repo_id for model item");
            };
            let filename = match item.model_type {
                Some(ModelType::File) => item.name.as_deref(),
                _ => None,
            };
            match models
                .download(
                    repo_id,
                    item.model_local_dir.as_deref(),
                    filename,
                    item.model_allow_patterns.as_deref(),
                    None,
                )
                .await
            {
                Ok(true) => DependencyResult::ok(&item.id, "already cached"),
                Ok(false) => DependencyResult::ok(&item.id, "downloaded"),
                Err(e) => DependencyResult::failed(&item.id, e.to_string()),
            }
        }
    }
}
