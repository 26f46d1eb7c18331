//! `GET|POST /api/sync-nodes` (§4.K, §6): reconcile the `PluginItem` list,
//! one `PluginInstaller::install` per item, acking the ids that ended up
//! installed back to the control plane. Mirrors `dependency_reconciler`'s
//! per-item match but returns synchronously, since the HTTP contract here
//! wants the full result list in the response body, not a background sweep.

use imagebridge_adapters::control_plane::ControlPlaneClient;
use imagebridge_adapters::plugins::PluginInstaller;
use imagebridge_core::deps::PluginItem;
use imagebridge_wire::control_plane::{paths, CustomNodesAckRequest};
use imagebridge_wire::http_api::SyncNodeResult;

/// §4.K: installs every item, then best-effort acks the ids that are now
/// present (whether newly cloned or already there) back to the control
/// plane so its desired-state list can drop them.
pub async fn sync_nodes(
    control_plane: &ControlPlaneClient,
    plugins: &PluginInstaller,
    items: &[PluginItem],
) -> Vec<SyncNodeResult> {
    let mut results = Vec::with_capacity(items.len());
    let mut installed_ids = Vec::new();

    for item in items {
        let result = match plugins.install(&item.url).await {
            Ok(true) => {
                installed_ids.push(item.id.clone());
                SyncNodeResult { id: item.id.clone(), status: "already_present".to_string(), message: None }
            }
            Ok(false) => {
                installed_ids.push(item.id.clone());
                SyncNodeResult { id: item.id.clone(), status: "cloned".to_string(), message: None }
            }
            Err(e) => SyncNodeResult { id: item.id.clone(), status: "error".to_string(), message: Some(e.to_string()) },
        };
        results.push(result);
    }

    if !installed_ids.is_empty() {
        let ack = CustomNodesAckRequest { node_ids: installed_ids };
        let _ = control_plane.post(paths::CUSTOM_NODES, &ack).await;
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_node_result_error_carries_message() {
        let result = SyncNodeResult { id: "n1".into(), status: "error".into(), message: Some("boom".into()) };
        assert_eq!(result.status, "error");
        assert_eq!(result.message.as_deref(), Some("boom"));
    }
}
