//! Tunnel supervisor (§3 TunnelState, §4.B). Spawns the tunnel binary,
//! scrapes its merged stdout/stderr for the public URL, and fires a
//! one-shot callback plus a recurring heartbeat once the URL is known.
//!
//! Subprocess-plus-reaper shape grounded on the teacher's
//! `adapters/agent/coop/spawn.rs`: spawn, pipe both streams, hand the
//! `Child` to a `tokio::spawn`ed task that waits on it so it never becomes
//! a zombie, log the exit.

use regex::Regex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"https://[a-z0-9-]+\.trycloudflare\.com")
            .expect("tunnel URL pattern is a fixed valid regex")
    })
}

pub type UrlReadyCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

struct Inner {
    /// Fires once to ask the reaper task to terminate the child; taken by
    /// whichever of `stop()` or natural exit happens first.
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    url: Mutex<Option<String>>,
    running: AtomicBool,
    port: u16,
    tunnel_binary: String,
    heartbeat_token: Mutex<Option<CancellationToken>>,
}

/// Process-wide tunnel singleton (§3 TunnelState ownership).
#[derive(Clone)]
pub struct TunnelSupervisor {
    inner: Arc<Inner>,
}

impl TunnelSupervisor {
    pub fn new(tunnel_binary: impl Into<String>, port: u16) -> Self {
        Self {
            inner: Arc::new(Inner {
                stop_tx: Mutex::new(None),
                url: Mutex::new(None),
                running: AtomicBool::new(false),
                port,
                tunnel_binary: tunnel_binary.into(),
                heartbeat_token: Mutex::new(None),
            }),
        }
    }

    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub async fn url(&self) -> Option<String> {
        self.inner.url.lock().await.clone()
    }

    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// §4.B `start()`: idempotent, probes the binary is on PATH first.
    pub async fn start(&self, on_url_ready: UrlReadyCallback, on_heartbeat: UrlReadyCallback) -> bool {
        if self.running() {
            return true;
        }
        if !self.probe_binary().await {
            tracing::error!(binary = %self.inner.tunnel_binary, "tunnel binary not found on PATH");
            return false;
        }

        let mut cmd = Command::new(&self.inner.tunnel_binary);
        cmd.arg("tunnel")
            .arg("--url")
            .arg(format!("http://localhost:{}", self.inner.port))
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "failed to spawn tunnel binary");
                return false;
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        self.inner.running.store(true, Ordering::SeqCst);

        let (stop_tx, mut stop_rx) = oneshot::channel();
        *self.inner.stop_tx.lock().await = Some(stop_tx);

        let inner = Arc::clone(&self.inner);
        let ready_cb = on_url_ready;
        let heartbeat_cb = on_heartbeat;
        let supervisor = self.clone();
        tokio::spawn(async move {
            scrape_lines(stdout, stderr, inner.clone(), ready_cb, heartbeat_cb, supervisor).await;
        });

        let reaper_inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let pid = child.id();
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => tracing::warn!(status = %status, "tunnel process exited"),
                    Err(e) => tracing::error!(error = %e, "failed to wait on tunnel process"),
                },
                _ = &mut stop_rx => {
                    #[cfg(unix)]
                    if let Some(pid) = pid {
                        let _ = Command::new("kill").arg("-15").arg(pid.to_string()).status().await;
                    }
                    let graceful = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
                    if graceful.is_err() {
                        let _ = child.kill().await;
                    }
                }
            }
            reaper_inner.running.store(false, Ordering::SeqCst);
            *reaper_inner.url.lock().await = None;
            reaper_inner.stop_tx.lock().await.take();
        });

        true
    }

    async fn probe_binary(&self) -> bool {
        let probe = Command::new(&self.inner.tunnel_binary).arg("--version").output();
        matches!(tokio::time::timeout(Duration::from_secs(10), probe).await, Ok(Ok(_)))
    }

    /// §4.B `stop()`: graceful terminate with a grace period, then forced
    /// kill. Also the target of the process-exit shutdown hook (§4.N).
    pub async fn stop(&self) {
        if let Some(token) = self.inner.heartbeat_token.lock().await.take() {
            token.cancel();
        }
        if let Some(tx) = self.inner.stop_tx.lock().await.take() {
            let _ = tx.send(());
        }
    }
}

async fn scrape_lines(
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    inner: Arc<Inner>,
    on_url_ready: UrlReadyCallback,
    on_heartbeat: UrlReadyCallback,
    supervisor: TunnelSupervisor,
) {
    let mut fired = false;

    if let Some(stdout) = stdout {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(line = %line, "tunnel stdout");
            if !fired {
                if let Some(m) = url_pattern().find(&line) {
                    let url = m.as_str().to_string();
                    *inner.url.lock().await = Some(url.clone());
                    fired = true;
                    on_url_ready(url.clone()).await;
                    spawn_heartbeat(&inner, &supervisor, on_heartbeat.clone()).await;
                }
            }
        }
    }
    if let Some(stderr) = stderr {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(line = %line, "tunnel stderr");
        }
    }
}

async fn spawn_heartbeat(inner: &Arc<Inner>, supervisor: &TunnelSupervisor, on_heartbeat: UrlReadyCallback) {
    let token = CancellationToken::new();
    *inner.heartbeat_token.lock().await = Some(token.clone());
    let supervisor = supervisor.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {
                    if let Some(url) = supervisor.url().await {
                        on_heartbeat(url).await;
                    }
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_pattern_matches_canonical_trycloudflare_url() {
        let line = "2024-01-01 Your quick Tunnel has been created! Visit it: https://silly-words-7.trycloudflare.com";
        let m = url_pattern().find(line).unwrap();
        assert_eq!(m.as_str(), "https://silly-words-7.trycloudflare.com");
    }

    #[test]
    fn url_pattern_does_not_match_other_hosts() {
        assert!(url_pattern().find("https://example.com/not-a-tunnel").is_none());
    }

    #[tokio::test]
    async fn start_returns_false_when_binary_missing() {
        let supervisor = TunnelSupervisor::new("definitely-not-a-real-binary-xyz", 8188);
        let noop: UrlReadyCallback = Arc::new(|_| Box::pin(async {}));
        let started = supervisor.start(noop.clone(), noop).await;
        assert!(!started);
        assert!(!supervisor.running());
    }

    #[tokio::test]
    async fn fresh_supervisor_reports_no_url() {
        let supervisor = TunnelSupervisor::new("cloudflared", 8188);
        assert!(supervisor.url().await.is_none());
        assert!(!supervisor.running());
    }
}
