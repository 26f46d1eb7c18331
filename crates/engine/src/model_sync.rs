//! `GET|POST /api/sync-models` (§4.K, §6): reconcile the `ModelItem` list
//! against the on-disk cache, bounded to [`MAX_CONCURRENT_CHECKS`] parallel
//! per-item checks. Unlike `dependency_reconciler`, this one is synchronous
//! from the caller's point of view (E3/E4): the HTTP response must already
//! reflect a cache hit's `progress: 100` before it's sent, so each item's
//! existence/staleness decision is awaited here rather than left to
//! `Downloader`'s background worker.

use imagebridge_adapters::download::Downloader;
use imagebridge_core::download::{forced_recheck_is_stale, precheck, PreCheckDecision};
use imagebridge_core::deps::ModelItem;
use imagebridge_core::Clock;
use imagebridge_wire::http_api::SyncModelResult;
use std::sync::Arc;
use tokio::sync::Semaphore;

const MAX_CONCURRENT_CHECKS: usize = 8;

/// One item's outcome plus whether it still needs a worker (used only to
/// total up `pending`/`errors`, not surfaced on the wire).
struct ItemOutcome {
    result: SyncModelResult,
    errored: bool,
}

/// §4.K: fetch nothing itself — the caller already has the `ModelItem` list
/// from the control plane — just reconciles it and returns the summarized
/// response body.
pub async fn sync_models<C: Clock + 'static>(
    downloader: &Downloader<C>,
    items: &[ModelItem],
) -> (Vec<SyncModelResult>, usize, usize, usize) {
    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_CHECKS));
    let mut tasks = Vec::with_capacity(items.len());
    for item in items {
        let downloader = downloader.clone();
        let item = item.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await;
            reconcile_one(&downloader, &item).await
        }));
    }

    let mut results = Vec::with_capacity(items.len());
    let mut completed = 0;
    let mut pending = 0;
    let mut errors = 0;
    for (task, item) in tasks.into_iter().zip(items) {
        let outcome = match task.await {
            Ok(outcome) => outcome,
            Err(_) => ItemOutcome {
                result: SyncModelResult { id: item.id.clone(), path: item.path.clone(), progress: -1 },
                errored: true,
            },
        };
        if outcome.errored {
            errors += 1;
        } else if outcome.result.progress >= 100 {
            completed += 1;
        } else {
            pending += 1;
        }
        results.push(outcome.result);
    }
    (results, completed, pending, errors)
}

/// §8 invariant 9 (E3): file present at the expected size means no network
/// GET at all, just a `progress: 100` row. §8 invariant (E4): a HEAD probe
/// disagreeing with the local size schedules a forced re-download and
/// reports `progress: 0` for this call; the eventual completion shows up
/// later via `/download_tasks`.
async fn reconcile_one<C: Clock + 'static>(downloader: &Downloader<C>, item: &ModelItem) -> ItemOutcome {
    let local_size = downloader.local_size(&item.path).await;

    match precheck(local_size.is_some(), false) {
        PreCheckDecision::AlreadyComplete => {
            let remote_len = downloader.head_content_length(&item.url).await;
            let size = local_size.unwrap_or(0);
            if forced_recheck_is_stale(size, remote_len) {
                downloader.submit(item.url.clone(), item.path.clone(), true);
                return ItemOutcome {
                    result: SyncModelResult { id: item.id.clone(), path: item.path.clone(), progress: 0 },
                    errored: false,
                };
            }
            ItemOutcome {
                result: SyncModelResult { id: item.id.clone(), path: item.path.clone(), progress: 100 },
                errored: false,
            }
        }
        PreCheckDecision::FetchFresh => {
            downloader.submit(item.url.clone(), item.path.clone(), false);
            ItemOutcome {
                result: SyncModelResult { id: item.id.clone(), path: item.path.clone(), progress: 0 },
                errored: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imagebridge_core::download::{forced_recheck_is_stale, precheck, PreCheckDecision};

    #[test]
    fn precheck_with_existing_file_and_no_force_is_already_complete() {
        assert_eq!(precheck(true, false), PreCheckDecision::AlreadyComplete);
    }

    #[test]
    fn matching_remote_length_is_not_stale() {
        assert!(!forced_recheck_is_stale(1000, Some(1000)));
    }

    #[test]
    fn mismatched_remote_length_is_stale() {
        assert!(forced_recheck_is_stale(10, Some(1000)));
    }
}
