//! The byte downloader (§4.D): resumable, progress-tracked, concurrency-
//! bounded, atomically published. Decision logic (precheck, backoff,
//! status classification) lives in `imagebridge_core::download`; this
//! module does the actual I/O.

use imagebridge_core::download::{
    backoff_delay, classify_status, forced_recheck_is_stale, normalize_path, precheck, DownloadTask,
    PreCheckDecision, TransferOutcome,
};
use imagebridge_core::{AgentConfig, Clock};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;

const CHUNK_SIZE: usize = 32 * 1024;
const PROGRESS_PUBLISH_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, thiserror::Error)]
pub enum DownloadError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("non-retryable status: {0}")]
    Permanent(u16),
    #[error("io error: {0}")]
    Io(String),
}

/// The process-wide download-task registry (§3 DownloadTask ownership).
/// Guarded by a single `parking_lot::Mutex`, never held across a
/// suspension point (§5 discipline table).
#[derive(Clone)]
pub struct Downloader<C: Clock> {
    tasks: Arc<Mutex<HashMap<String, DownloadTask>>>,
    http: reqwest::Client,
    semaphore: Arc<Semaphore>,
    install_dir: PathBuf,
    max_retries: u32,
    clock: C,
    backend_base_url: String,
}

impl<C: Clock + 'static> Downloader<C> {
    pub fn new(config: &AgentConfig, clock: C) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(config.limits.max_connections_per_host)
            .timeout(config.limits.download_total_timeout)
            .connect_timeout(config.limits.download_connect_timeout)
            .build()
            .unwrap_or_default();
        Self {
            tasks: Arc::new(Mutex::new(HashMap::new())),
            http,
            semaphore: Arc::new(Semaphore::new(config.limits.max_concurrent_downloads)),
            install_dir: config.backend_install_dir.clone(),
            max_retries: config.limits.max_download_retries,
            clock,
            backend_base_url: config.backend_base_url.clone(),
        }
    }

    pub fn task(&self, task_id: &str) -> Option<DownloadTask> {
        self.tasks.lock().get(task_id).cloned()
    }

    pub fn all_tasks(&self) -> Vec<DownloadTask> {
        self.tasks.lock().values().cloned().collect()
    }

    /// Joins a control-plane-supplied `path` (which may look absolute, e.g.
    /// `/models/a/f.bin`) onto the install directory. Must stay consistent
    /// with `TaskKey::new`'s normalization or the task id and the on-disk
    /// destination diverge.
    pub fn dest_path(&self, path: &str) -> PathBuf {
        self.install_dir.join(normalize_path(path))
    }

    /// §4.D `submit(url, path, force) -> taskId`.
    pub fn submit(&self, url: String, path: String, force: bool) -> String {
        let key = imagebridge_core::download::TaskKey::new(url.clone(), path.clone());
        let task_id = key.as_string();

        {
            let mut tasks = self.tasks.lock();
            if !force {
                if tasks.contains_key(&task_id) {
                    return task_id;
                }
            } else {
                tasks.remove(&task_id);
            }
            tasks.insert(task_id.clone(), DownloadTask::starting(url.clone(), path.clone()));
        }

        let this = self.clone();
        let dest = self.dest_path(&path);
        tokio::spawn(async move {
            let _permit = this.semaphore.acquire().await;
            this.run_worker(task_id, url, dest, force).await;
        });

        key.as_string()
    }

    async fn run_worker(&self, task_id: String, url: String, dest: PathBuf, force: bool) {
        if let Err(e) = self.run_worker_inner(&task_id, &url, &dest, force).await {
            tracing::error!(task_id = %task_id, error = %e, "download failed");
        }
        self.notify_backend_cache_refresh().await;
    }

    async fn run_worker_inner(
        &self,
        task_id: &str,
        url: &str,
        dest: &Path,
        force: bool,
    ) -> Result<(), DownloadError> {
        let tmp_path = tmp_sibling(dest);

        match precheck(dest.exists(), force) {
            PreCheckDecision::AlreadyComplete => {
                let size = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
                self.update(task_id, |t| {
                    t.bytes_downloaded = size;
                    t.total_bytes = size;
                    t.mark_completed();
                });
                return Ok(());
            }
            PreCheckDecision::FetchFresh => {}
        }

        if force && dest.exists() {
            let local_size = tokio::fs::metadata(dest).await.map(|m| m.len()).unwrap_or(0);
            let remote_len = self.head_content_length(url).await;
            if forced_recheck_is_stale(local_size, remote_len) {
                let _ = tokio::fs::remove_file(dest).await;
                let _ = tokio::fs::remove_file(&tmp_path).await;
            } else {
                self.update(task_id, |t| {
                    t.bytes_downloaded = local_size;
                    t.total_bytes = local_size;
                    t.mark_completed();
                });
                return Ok(());
            }
        }

        let mut attempt = 0u32;
        loop {
            match self.transfer_once(task_id, url, dest, &tmp_path).await {
                Ok(()) => {
                    self.update(task_id, DownloadTask::mark_completed);
                    return Ok(());
                }
                Err(DownloadError::Permanent(status)) => {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    self.update(task_id, |t| t.mark_failed_permanent(&format!("HTTP {status}")));
                    return Err(DownloadError::Permanent(status));
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    self.update(task_id, |t| t.mark_retrying(attempt, &e.to_string()));
                    tokio::time::sleep(backoff_delay(attempt)).await;
                }
                Err(e) => {
                    let _ = tokio::fs::remove_file(&tmp_path).await;
                    self.update(task_id, |t| t.mark_error(&e.to_string()));
                    return Err(e);
                }
            }
        }
    }

    async fn transfer_once(
        &self,
        task_id: &str,
        url: &str,
        dest: &Path,
        tmp_path: &Path,
    ) -> Result<(), DownloadError> {
        if let Some(parent) = dest.parent() {
            let _ = tokio::fs::create_dir_all(parent).await;
        }

        let resume_from = tokio::fs::metadata(tmp_path).await.map(|m| m.len()).unwrap_or(0);

        let mut req = self.http.get(url);
        if resume_from > 0 {
            req = req.header("Range", format!("bytes={resume_from}-"));
        }
        let resp = req.send().await.map_err(|e| DownloadError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return match classify_status(status.as_u16()) {
                TransferOutcome::Permanent => Err(DownloadError::Permanent(status.as_u16())),
                TransferOutcome::Retryable => Err(DownloadError::Transport(format!("HTTP {status}"))),
            };
        }

        let total_bytes = if status.as_u16() == 206 {
            content_range_total(resp.headers())
        } else {
            resp.content_length()
        }
        .unwrap_or(0);

        let mut file = if resume_from > 0 && status.as_u16() == 206 {
            tokio::fs::OpenOptions::new()
                .append(true)
                .open(tmp_path)
                .await
                .map_err(|e| DownloadError::Io(e.to_string()))?
        } else {
            tokio::fs::File::create(tmp_path).await.map_err(|e| DownloadError::Io(e.to_string()))?
        };

        let mut downloaded = resume_from;
        let mut last_publish = self.clock.now();
        let mut stream = resp.bytes_stream();
        use futures_util::StreamExt;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::Transport(e.to_string()))?;
            for piece in chunk.chunks(CHUNK_SIZE) {
                file.write_all(piece).await.map_err(|e| DownloadError::Io(e.to_string()))?;
                downloaded += piece.len() as u64;
            }
            if self.clock.now().duration_since(last_publish) >= PROGRESS_PUBLISH_INTERVAL {
                self.update(task_id, |t| t.mark_progress(downloaded, total_bytes));
                last_publish = self.clock.now();
            }
        }
        file.flush().await.map_err(|e| DownloadError::Io(e.to_string()))?;
        drop(file);

        tokio::fs::rename(tmp_path, dest).await.map_err(|e| DownloadError::Io(e.to_string()))?;
        self.update(task_id, |t| t.mark_progress(downloaded, total_bytes));
        Ok(())
    }

    /// Size of the file at `path` on disk, if any, relative to the install
    /// directory's normalization rules.
    pub async fn local_size(&self, path: &str) -> Option<u64> {
        tokio::fs::metadata(self.dest_path(path)).await.ok().map(|m| m.len())
    }

    /// Exposed for callers (model sync) that need to decide staleness
    /// themselves before handing off to `submit`.
    pub async fn head_content_length(&self, url: &str) -> Option<u64> {
        let resp = self.http.head(url).send().await.ok()?;
        if !resp.status().is_success() {
            return None;
        }
        resp.content_length()
    }

    /// §4.D step 4: best-effort notify the backend to refresh its model
    /// cache. Failure is swallowed — this is advisory, not correctness.
    async fn notify_backend_cache_refresh(&self) {
        let url = format!("{}/free", self.backend_base_url.trim_end_matches('/'));
        let result = tokio::time::timeout(Duration::from_secs(10), self.http.get(&url).send()).await;
        if let Err(_) | Ok(Err(_)) = result {
            tracing::debug!("backend cache refresh ping failed (advisory only)");
        }
    }

    fn update(&self, task_id: &str, f: impl FnOnce(&mut DownloadTask)) {
        if let Some(task) = self.tasks.lock().get_mut(task_id) {
            f(task);
        }
    }
}

fn tmp_sibling(dest: &Path) -> PathBuf {
    let mut tmp = dest.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

fn content_range_total(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let value = headers.get(reqwest::header::CONTENT_RANGE)?.to_str().ok()?;
    let total = value.rsplit('/').next()?;
    total.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmp_sibling_appends_extension() {
        assert_eq!(tmp_sibling(Path::new("/a/b/f.bin")), PathBuf::from("/a/b/f.bin.tmp"));
    }

    #[test]
    fn content_range_total_parses_trailing_size() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::CONTENT_RANGE, "bytes 10-999/1000".parse().unwrap());
        assert_eq!(content_range_total(&headers), Some(1000));
    }

    #[test]
    fn content_range_total_missing_header_is_none() {
        let headers = reqwest::header::HeaderMap::new();
        assert_eq!(content_range_total(&headers), None);
    }

    #[tokio::test]
    async fn submit_with_existing_task_and_no_force_returns_same_id() {
        let cfg = Arc::new(AgentConfig::from_env());
        let downloader = Downloader::new(&cfg, imagebridge_core::SystemClock);
        let id1 = downloader.submit("https://x/y.bin".into(), "models/y.bin".into(), false);
        // Manually seed so the second submit sees it already present without a real worker.
        let id2 = downloader.submit("https://x/y.bin".into(), "models/y.bin".into(), false);
        assert_eq!(id1, id2);
    }
}
