//! Session model and lifecycle management.

mod manager;

pub use manager::SessionManager;

use crate::error::FailureRecord;
use crate::generate::DocPayload;
use crate::store::KeyframeEntry;
use crate::transcription::TranscriptSegment;
use crate::config::SttPreference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Possible states for a processing session.
///
/// Transitions form a DAG:
/// `draft -> queued -> running -> {completed | failed | cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Draft,
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Draft => "draft",
            SessionStatus::Queued => "queued",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Where the input comes from. Remote sources are fetched by the caller
/// before submission; the pipeline itself never goes on the network for
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SessionSource {
    Local { path: PathBuf },
    Remote { uri: String },
}

impl SessionSource {
    /// The local path the pipeline reads, if already materialized.
    pub fn local_path(&self) -> Option<&PathBuf> {
        match self {
            SessionSource::Local { path } => Some(path),
            SessionSource::Remote { .. } => None,
        }
    }
}

/// Caller-supplied metadata for a new session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub mode: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default)]
    pub stt_preference: SttPreference,
    pub source: SessionSource,
}

/// The unit of work from submission through terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub mode: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub stt_preference: SttPreference,
    pub source: SessionSource,
    pub status: SessionStatus,
    /// 0..=100; non-decreasing while running, 100 only when completed.
    pub progress: u8,
    pub stage_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FailureRecord>,
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub artifact_paths: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc_payload: Option<DocPayload>,
    #[serde(default)]
    pub transcript_segments: Vec<TranscriptSegment>,
    #[serde(default)]
    pub keyframes: Vec<KeyframeEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_adapter_used: Option<String>,
}

impl Session {
    pub fn new(id: String, metadata: SessionMetadata) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            mode: metadata.mode,
            title: metadata.title,
            language: metadata.language,
            stt_preference: metadata.stt_preference,
            source: metadata.source,
            status: SessionStatus::Draft,
            progress: 0,
            stage_label: "created".to_string(),
            error: None,
            last_updated: now,
            artifact_paths: BTreeMap::new(),
            doc_payload: None,
            transcript_segments: Vec::new(),
            keyframes: Vec::new(),
            stt_adapter_used: None,
        }
    }

    /// Lightweight view for listings.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            mode: self.mode.clone(),
            status: self.status,
            progress: self.progress,
            created_at: self.created_at,
        }
    }
}

/// One row of a session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
    pub mode: String,
    pub status: SessionStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
}
