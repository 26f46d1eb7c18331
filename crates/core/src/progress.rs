//! Progress-tracker entry model (§3 ProgressEntry, §4.G, §8 invariant 6).
//!
//! The websocket reader in `imagebridge-adapters::progress` owns the actual
//! subscriber session; this module only holds the upsert rules so they can
//! be unit tested without a live socket.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub percent: f64,
    pub node: Option<String>,
    pub timestamp_ms: u64,
    pub value: f64,
    pub max: f64,
    pub status: ProgressStatus,
    pub error: Option<String>,
}

impl ProgressEntry {
    pub fn from_progress_event(node: Option<String>, value: f64, max: f64, timestamp_ms: u64) -> Self {
        let percent = if max > 0.0 { (value / max) * 100.0 } else { 0.0 };
        Self {
            percent,
            node,
            timestamp_ms,
            value,
            max,
            status: ProgressStatus::Running,
            error: None,
        }
    }

    pub fn completed(timestamp_ms: u64) -> Self {
        Self {
            percent: 100.0,
            node: None,
            timestamp_ms,
            value: 0.0,
            max: 0.0,
            status: ProgressStatus::Completed,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            percent: 0.0,
            node: None,
            timestamp_ms,
            value: 0.0,
            max: 0.0,
            status: ProgressStatus::Error,
            error: Some(message.into()),
        }
    }
}

/// §8 invariant 6: once a job is `Completed`, a later stray `progress` event
/// for the same id must not demote it back to `Running`. `error` events are
/// still allowed to override (a backend can legitimately fail after it
/// reported a premature completion is not expected, but we never let a
/// late `progress` tick undo a terminal state of either kind).
pub fn upsert(existing: Option<&ProgressEntry>, incoming: ProgressEntry) -> ProgressEntry {
    match existing {
        Some(prev) if prev.status != ProgressStatus::Running && incoming.status == ProgressStatus::Running => {
            prev.clone()
        }
        _ => incoming,
    }
}
