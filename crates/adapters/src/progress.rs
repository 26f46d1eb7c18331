//! The backend event-stream subscriber (§4.G): one long-lived websocket
//! session for the life of the process, reconnecting on every close or
//! connect failure. Owns the shared progress map; the upsert rule itself
//! lives in `imagebridge_core::progress`.

use futures_util::StreamExt;
use imagebridge_core::progress::{upsert, ProgressEntry};
use imagebridge_core::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(10);

struct Inner {
    entries: Mutex<HashMap<String, ProgressEntry>>,
    connected: AtomicBool,
}

/// §3 ownership: the process-wide progress map, plus the `connected` flag
/// HTTP handlers check before answering a status query (§4.G, §4.K).
#[derive(Clone)]
pub struct ProgressSubscriber {
    inner: Arc<Inner>,
}

impl ProgressSubscriber {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                connected: AtomicBool::new(false),
            }),
        }
    }

    pub fn connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    pub fn get(&self, job_id: &str) -> Option<ProgressEntry> {
        self.inner.entries.lock().get(job_id).cloned()
    }

    pub fn all(&self) -> HashMap<String, ProgressEntry> {
        self.inner.entries.lock().clone()
    }

    /// Runs forever, reconnecting per §4.G connection policy. Intended to be
    /// `tokio::spawn`ed once by the bootstrapper.
    pub async fn run<C: Clock>(&self, ws_url: String, client_id: String, clock: C) -> ! {
        loop {
            let url = format!("{}?clientId={}", ws_url.trim_end_matches('/'), client_id);
            match tokio_tungstenite::connect_async(&url).await {
                Ok((stream, _)) => {
                    self.inner.connected.store(true, Ordering::SeqCst);
                    tracing::info!("progress subscriber connected");
                    self.read_loop(stream, &clock).await;
                    self.inner.connected.store(false, Ordering::SeqCst);
                    tracing::warn!("progress subscriber disconnected, reconnecting");
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "progress subscriber connect failed");
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
            }
        }
    }

    async fn read_loop<S, C: Clock>(&self, mut stream: S, clock: &C)
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(msg) = stream.next().await {
            let Ok(Message::Text(text)) = msg else {
                continue;
            };
            self.handle_event(&text, clock.epoch_ms());
        }
    }

    /// §4.G event handling: `progress` upserts, `executed` completes,
    /// `execution_error` overwrites with an error entry.
    fn handle_event(&self, text: &str, now_ms: u64) {
        let Ok(event) = serde_json::from_str::<serde_json::Value>(text) else {
            return;
        };
        let event_type = event["type"].as_str().unwrap_or_default();
        let data = &event["data"];
        let Some(job_id) = data["prompt_id"].as_str().or_else(|| data["job_id"].as_str()) else {
            return;
        };

        let incoming = match event_type {
            "progress" => {
                let value = data["value"].as_f64().unwrap_or(0.0);
                let max = data["max"].as_f64().unwrap_or(0.0);
                let node = data["node"].as_str().map(str::to_string);
                ProgressEntry::from_progress_event(node, value, max, now_ms)
            }
            "executed" => ProgressEntry::completed(now_ms),
            "execution_error" => {
                let message = data["exception_message"].as_str().unwrap_or("execution error");
                ProgressEntry::error(message, now_ms)
            }
            _ => return,
        };

        let mut entries = self.inner.entries.lock();
        let existing = entries.get(job_id).cloned();
        entries.insert(job_id.to_string(), upsert(existing.as_ref(), incoming));
    }
}

impl Default for ProgressSubscriber {
    fn default() -> Self {
        Self::new()
    }
}
