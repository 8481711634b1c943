//! Per-session JSONL trace recording.
//!
//! One event per line, enough on its own to replay the pipeline's
//! decisions for a post-mortem. Trace writes are best-effort: a failing
//! disk never fails the pipeline, it only logs a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

/// Event kinds within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Start,
    End,
    Error,
    Note,
}

/// One line of the trace file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub ts: DateTime<Utc>,
    pub session_id: String,
    pub stage: String,
    pub kind: TraceKind,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Append-only writer of [`TraceEvent`]s for one session.
///
/// The file is opened lazily on the first event and closed when the
/// session reaches a terminal state. Events within a session are totally
/// ordered by the emission order (the writer holds a lock per append).
pub struct TraceRecorder {
    session_id: String,
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl TraceRecorder {
    pub fn new(session_id: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.to_string(),
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    /// Record a stage start.
    pub fn start(&self, stage: &str, attrs: BTreeMap<String, serde_json::Value>) {
        self.append(TraceKind::Start, stage, attrs, None, None);
    }

    /// Record a stage end with its wall-clock duration.
    pub fn end(&self, stage: &str, duration_ms: u64, attrs: BTreeMap<String, serde_json::Value>) {
        self.append(TraceKind::End, stage, attrs, Some(duration_ms), None);
    }

    /// Record a stage error.
    pub fn error(&self, stage: &str, message: &str) {
        self.append(
            TraceKind::Error,
            stage,
            BTreeMap::new(),
            None,
            Some(message.to_string()),
        );
    }

    /// Record an informational note (degradations, fallbacks).
    pub fn note(&self, stage: &str, attrs: BTreeMap<String, serde_json::Value>) {
        self.append(TraceKind::Note, stage, attrs, None, None);
    }

    /// Flush and drop the file handle. Later events reopen the file, so
    /// closing twice is harmless.
    pub fn close(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.take() {
                drop(file);
            }
        }
    }

    fn append(
        &self,
        kind: TraceKind,
        stage: &str,
        attrs: BTreeMap<String, serde_json::Value>,
        duration_ms: Option<u64>,
        error: Option<String>,
    ) {
        let event = TraceEvent {
            ts: Utc::now(),
            session_id: self.session_id.clone(),
            stage: stage.to_string(),
            kind,
            attrs,
            duration_ms,
            error,
        };

        let mut guard = match self.file.lock() {
            Ok(guard) => guard,
            Err(_) => {
                warn!("Trace lock poisoned for session {}", self.session_id);
                return;
            }
        };

        if guard.is_none() {
            match OpenOptions::new().create(true).append(true).open(&self.path) {
                Ok(file) => *guard = Some(file),
                Err(e) => {
                    warn!("Cannot open trace file {}: {}", self.path.display(), e);
                    return;
                }
            }
        }

        let file = guard.as_mut().expect("file opened above");
        match serde_json::to_string(&event) {
            Ok(line) => {
                if let Err(e) = writeln!(file, "{}", line) {
                    warn!("Trace write failed for {}: {}", self.session_id, e);
                }
            }
            Err(e) => warn!("Trace serialization failed: {}", e),
        }
    }
}

/// Read back a trace file (used by hosts and tests).
pub fn read_events(path: &Path) -> crate::error::Result<Vec<TraceEvent>> {
    let content = std::fs::read_to_string(path)?;
    let mut events = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        events.push(serde_json::from_str(line)?);
    }
    Ok(events)
}

/// Convenience for building one-entry attr maps.
pub fn attrs<const N: usize>(pairs: [(&str, serde_json::Value); N]) -> BTreeMap<String, serde_json::Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
