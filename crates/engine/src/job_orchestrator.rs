//! The job orchestrator (§4.J): pulls pending workflow runs from the
//! control plane, rewrites external inputs, submits each to the backend,
//! and reports the immediate queue/fail outcome back. Terminal status is
//! observed separately through the progress tracker (§4.G); this module
//! only wires the synchronous handoff plus an optional history poll.

use imagebridge_adapters::backend::BackendClient;
use imagebridge_adapters::control_plane::ControlPlaneClient;
use imagebridge_wire::control_plane::{paths, WorkflowRunItem, WorkflowRunResult, RunStatus};
use std::path::Path;

#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub queued: bool,
}

/// §4.J: fetch and process every pending run. Returns `(processed, failed)`
/// counts for the HTTP surface's trigger response.
pub async fn run_pending_workflows(
    control_plane: &ControlPlaneClient,
    backend: &BackendClient,
    http: &reqwest::Client,
    input_dir: &Path,
) -> (usize, usize) {
    let Some(body) = control_plane.get(paths::WORKFLOW_RUN_LIST).await else {
        return (0, 0);
    };
    // `api/machine/workflow-run` returns a bare JSON array (original
    // `workflow_run.py:96`), not an `{runs: […]}` wrapper.
    let runs: Vec<WorkflowRunItem> = serde_json::from_value::<Vec<WorkflowRunItem>>(body).unwrap_or_default();

    let mut processed = 0;
    let mut failed = 0;
    for run in runs {
        processed += 1;
        if process_one_run(control_plane, backend, http, input_dir, &run).await.queued {
            // queued successfully; terminal state lands via §4.G separately
        } else {
            failed += 1;
        }
    }
    (processed, failed)
}

async fn process_one_run(
    control_plane: &ControlPlaneClient,
    backend: &BackendClient,
    http: &reqwest::Client,
    input_dir: &Path,
    run: &WorkflowRunItem,
) -> RunOutcome {
    let mut prompt = run.prompt.clone();
    crate::input_rewriter::rewrite_external_inputs(&mut prompt, http, input_dir).await;

    match backend.submit_prompt(&prompt).await {
        Ok(prompt_id) => {
            let ack = serde_json::json!({ "prompt_id": prompt_id });
            let _ = control_plane.post(&paths::workflow_run_queue(&run.id), &ack).await;
            RunOutcome { queued: true }
        }
        Err(e) => {
            let result = WorkflowRunResult {
                status: RunStatus::Failed,
                error: Some(e.to_string()),
                outputs: None,
                started_at: None,
                ended_at: None,
            };
            let _ = control_plane.post(&paths::workflow_run_result(&run.id), &result).await;
            RunOutcome { queued: false }
        }
    }
}

/// §4.J step 5: optional poll of the backend's history endpoint, posting
/// the final outcome back to the control plane once a job has finished.
pub async fn report_terminal_result(
    control_plane: &ControlPlaneClient,
    backend: &BackendClient,
    run_id: &str,
    job_id: &str,
) {
    let Ok(Some(history)) = backend.history(job_id).await else {
        return;
    };
    let status = match history.status.as_deref() {
        Some("completed") => RunStatus::Completed,
        Some("error") => RunStatus::Error,
        _ => return,
    };
    let result = WorkflowRunResult {
        status,
        error: history.error_message,
        outputs: Some(history.output_files),
        started_at: history.started_at_ms,
        ended_at: history.completed_at_ms,
    };
    let _ = control_plane.post(&paths::workflow_run_result(run_id), &result).await;
}
