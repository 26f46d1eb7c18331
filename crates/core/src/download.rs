//! Download task bookkeeping and retry policy (§3 DownloadTask, §4.D, §8
//! invariants 3-5, 10-11). Pure decision logic only — actually streaming
//! bytes is `imagebridge-adapters::download`.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Status a [`DownloadTask`] can be in. `Error` is retryable-exhausted-but-
/// transient-looking; `FailedPermanent` is a terminal non-retryable outcome
/// (401/403/404/410). The two are distinguished so callers can tell "try
/// again later" from "don't bother".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Starting,
    Downloading,
    Retrying,
    Completed,
    Error,
    FailedPermanent,
}

/// The task key identifying a download across submissions: `(url, path)`.
/// §8 invariant 4 — equal keys must collide onto one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub url: String,
    pub path: String,
}

impl TaskKey {
    pub fn new(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: normalize_path(&path.into()),
        }
    }

    /// Canonical string form used as the map key and as the public task id.
    pub fn as_string(&self) -> String {
        format!("{}:{}", self.url, self.path)
    }
}

/// Strips a leading `/` and normalizes separators so a control-plane-
/// supplied absolute-looking path (e.g. `/models/a/f.bin`) joins safely
/// onto an install directory instead of being treated as filesystem-root
/// absolute by `Path::join`.
pub fn normalize_path(path: &str) -> String {
    path.trim_start_matches('/').replace('\\', "/")
}

/// Snapshot of one download's progress, as stored in the process-wide map
/// and as returned to HTTP callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    pub url: String,
    pub path: String,
    /// -1 = error, 0..=100 otherwise.
    pub progress: i32,
    pub status: DownloadStatus,
    pub bytes_downloaded: u64,
    /// 0 = unknown total size.
    pub total_bytes: u64,
    pub message: String,
    pub retry_count: u32,
}

impl DownloadTask {
    pub fn starting(url: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            progress: 0,
            status: DownloadStatus::Starting,
            bytes_downloaded: 0,
            total_bytes: 0,
            message: "starting".to_string(),
            retry_count: 0,
        }
    }

    pub fn already_cached(url: impl Into<String>, path: impl Into<String>, size: u64) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            progress: 100,
            status: DownloadStatus::Completed,
            bytes_downloaded: size,
            total_bytes: size,
            message: "already present".to_string(),
            retry_count: 0,
        }
    }

    pub fn mark_progress(&mut self, bytes_downloaded: u64, total_bytes: u64) {
        self.status = DownloadStatus::Downloading;
        self.bytes_downloaded = bytes_downloaded;
        self.total_bytes = total_bytes;
        self.progress = if total_bytes > 0 {
            ((bytes_downloaded as f64 / total_bytes as f64) * 100.0).clamp(0.0, 100.0) as i32
        } else {
            // Unknown total: report "in progress" without claiming a percent.
            0
        };
        self.message = format!("downloading ({bytes_downloaded} bytes)");
    }

    pub fn mark_completed(&mut self) {
        self.status = DownloadStatus::Completed;
        self.progress = 100;
        self.message = "completed".to_string();
        if self.total_bytes == 0 {
            self.total_bytes = self.bytes_downloaded;
        }
    }

    pub fn mark_retrying(&mut self, attempt: u32, reason: &str) {
        self.status = DownloadStatus::Retrying;
        self.retry_count = attempt;
        self.message = format!("retrying (attempt {attempt}): {reason}");
    }

    pub fn mark_error(&mut self, reason: &str) {
        self.status = DownloadStatus::Error;
        self.progress = -1;
        self.message = reason.to_string();
    }

    pub fn mark_failed_permanent(&mut self, reason: &str) {
        self.status = DownloadStatus::FailedPermanent;
        self.progress = -1;
        self.message = reason.to_string();
    }
}

/// Whether an HTTP status (or transport failure) is worth retrying.
/// §4.D step 5, §7 Transient vs Terminal transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    Retryable,
    Permanent,
}

pub fn classify_status(status: u16) -> TransferOutcome {
    match status {
        401 | 403 | 404 | 410 => TransferOutcome::Permanent,
        500..=599 => TransferOutcome::Retryable,
        _ => TransferOutcome::Retryable,
    }
}

/// Exponential backoff with jitter: `min(2^attempt * 1s, 60s) + jitter([0.1,0.3] * delay)`.
/// `attempt` is 1-indexed (the first retry is attempt 1).
pub fn backoff_delay(attempt: u32) -> Duration {
    backoff_delay_with_rng(attempt, &mut rand::thread_rng())
}

pub fn backoff_delay_with_rng<R: Rng + ?Sized>(attempt: u32, rng: &mut R) -> Duration {
    let base_secs = 2f64.powi(attempt as i32).min(60.0);
    let jitter_frac: f64 = rng.gen_range(0.1..=0.3);
    let jittered = base_secs + base_secs * jitter_frac;
    Duration::from_secs_f64(jittered.min(60.0 * 1.3))
}

/// §4.D step 1: decide what to do before transferring anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreCheckDecision {
    /// File exists and `force` was false: done, no network call.
    AlreadyComplete,
    /// Delete any existing destination file (and `.tmp`) and fetch fresh.
    FetchFresh,
}

pub fn precheck(destination_exists: bool, force: bool) -> PreCheckDecision {
    if destination_exists && !force {
        PreCheckDecision::AlreadyComplete
    } else {
        PreCheckDecision::FetchFresh
    }
}

/// §4.D step 1, forced re-check: decide whether a HEAD probe result means
/// the local file is still valid, or must be deleted and re-fetched.
pub fn forced_recheck_is_stale(
    local_size: u64,
    remote_content_length: Option<u64>,
) -> bool {
    if local_size == 0 {
        return true;
    }
    match remote_content_length {
        Some(len) => len != local_size,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_key_collapses_equal_url_and_path() {
        let a = TaskKey::new("https://x/y.bin", "/models/a/y.bin");
        let b = TaskKey::new("https://x/y.bin", "models/a/y.bin");
        assert_eq!(a, b);
        assert_eq!(a.as_string(), b.as_string());
    }

    #[test]
    fn task_key_distinguishes_different_paths() {
        let a = TaskKey::new("https://x/y.bin", "models/a/y.bin");
        let b = TaskKey::new("https://x/y.bin", "models/b/y.bin");
        assert_ne!(a, b);
    }

    #[test]
    fn precheck_without_force_short_circuits() {
        assert_eq!(precheck(true, false), PreCheckDecision::AlreadyComplete);
        assert_eq!(precheck(false, false), PreCheckDecision::FetchFresh);
    }

    #[test]
    fn precheck_with_force_always_refetches() {
        assert_eq!(precheck(true, true), PreCheckDecision::FetchFresh);
        assert_eq!(precheck(false, true), PreCheckDecision::FetchFresh);
    }

    #[test]
    fn empty_local_file_is_always_stale() {
        assert!(forced_recheck_is_stale(0, Some(0)));
        assert!(forced_recheck_is_stale(0, None));
    }

    #[test]
    fn matching_content_length_is_not_stale() {
        assert!(!forced_recheck_is_stale(1000, Some(1000)));
    }

    #[test]
    fn mismatched_or_unknown_content_length_is_stale() {
        assert!(forced_recheck_is_stale(1000, Some(999)));
        assert!(forced_recheck_is_stale(1000, None));
    }

    #[test]
    fn classify_status_matches_design_table() {
        assert_eq!(classify_status(401), TransferOutcome::Permanent);
        assert_eq!(classify_status(403), TransferOutcome::Permanent);
        assert_eq!(classify_status(404), TransferOutcome::Permanent);
        assert_eq!(classify_status(410), TransferOutcome::Permanent);
        assert_eq!(classify_status(500), TransferOutcome::Retryable);
        assert_eq!(classify_status(503), TransferOutcome::Retryable);
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let mut rng = rand::thread_rng();
        let d1 = backoff_delay_with_rng(1, &mut rng);
        let d2 = backoff_delay_with_rng(2, &mut rng);
        assert!(d1.as_secs_f64() >= 2.0 && d1.as_secs_f64() <= 2.6);
        assert!(d2.as_secs_f64() >= 4.0 && d2.as_secs_f64() <= 5.2);
        let capped = backoff_delay_with_rng(10, &mut rng);
        assert!(capped.as_secs_f64() <= 60.0 * 1.3);
    }

    #[test]
    fn mark_progress_reports_zero_percent_when_total_unknown() {
        let mut task = DownloadTask::starting("https://x/y", "y");
        task.mark_progress(12345, 0);
        assert_eq!(task.progress, 0);
        assert_eq!(task.status, DownloadStatus::Downloading);
        assert_eq!(task.bytes_downloaded, 12345);
    }

    #[test]
    fn mark_completed_backfills_total_bytes_when_unknown() {
        let mut task = DownloadTask::starting("https://x/y", "y");
        task.mark_progress(500, 0);
        task.mark_completed();
        assert_eq!(task.total_bytes, 500);
        assert_eq!(task.progress, 100);
    }
}
