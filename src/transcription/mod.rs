//! Speech-to-text capability and adapter selection.
//!
//! Two adapters cover the speed/quality trade-off: a fast local
//! whisper.cpp runner and an accurate remote API transcriber. The
//! [`TranscriberSelector`] applies the caller's preference and falls back
//! to the other adapter on failure; when both fail, the pipeline continues
//! with an empty transcript unless the mode demands one.

mod format;
mod local;
mod models;
mod remote;

pub use format::{format_transcript, TranscriptFormat};
pub use local::LocalWhisperTranscriber;
pub use models::{format_timestamp, normalize_segments, Transcript, TranscriptSegment};
pub use remote::RemoteWhisperTranscriber;

use crate::config::SttPreference;
use crate::error::{Result, VidereError};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Trait for transcription adapters.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short adapter identifier recorded with the session (e.g. "local",
    /// "remote").
    fn name(&self) -> &str;

    /// Whether the adapter can currently serve requests. The first call
    /// may run a self-test; later calls must answer from cache.
    async fn available(&self) -> bool;

    /// Transcribe an audio file, returning raw (pre-normalization)
    /// segments.
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptSegment>>;
}

/// What the selector produced for one session.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionOutcome {
    pub transcript: Transcript,
    /// Name of the adapter that produced the transcript, if any succeeded.
    pub adapter_used: Option<String>,
    /// Set when the preferred adapter failed and another one answered.
    pub fell_back_to: Option<String>,
}

/// Chooses between the fast local and accurate remote adapters.
pub struct TranscriberSelector {
    local: Arc<dyn Transcriber>,
    remote: Arc<dyn Transcriber>,
    /// `auto` stays local when the audio is at most this long.
    auto_local_max_sec: f64,
}

impl TranscriberSelector {
    pub fn new(
        local: Arc<dyn Transcriber>,
        remote: Arc<dyn Transcriber>,
        auto_local_max_sec: f64,
    ) -> Self {
        Self {
            local,
            remote,
            auto_local_max_sec,
        }
    }

    /// Transcribe with fallback. Adapter failures degrade to an empty
    /// outcome; only cancellation propagates as an error.
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        audio_duration_sec: f64,
        language: Option<&str>,
        preference: SttPreference,
        cancel: &CancellationToken,
    ) -> Result<TranscriptionOutcome> {
        let (first, second) = self.order(preference, audio_duration_sec).await;

        match self.try_adapter(&first, audio_path, language, cancel).await? {
            Some(transcript) => {
                return Ok(TranscriptionOutcome {
                    transcript,
                    adapter_used: Some(first.name().to_string()),
                    fell_back_to: None,
                });
            }
            None => {
                warn!(
                    "{} transcriber failed, falling back to {}",
                    first.name(),
                    second.name()
                );
            }
        }

        match self.try_adapter(&second, audio_path, language, cancel).await? {
            Some(transcript) => Ok(TranscriptionOutcome {
                transcript,
                adapter_used: Some(second.name().to_string()),
                fell_back_to: Some(second.name().to_string()),
            }),
            None => {
                warn!("All transcription adapters failed");
                Ok(TranscriptionOutcome::default())
            }
        }
    }

    async fn order(
        &self,
        preference: SttPreference,
        audio_duration_sec: f64,
    ) -> (Arc<dyn Transcriber>, Arc<dyn Transcriber>) {
        match preference {
            SttPreference::Fast => (self.local.clone(), self.remote.clone()),
            SttPreference::Accurate => (self.remote.clone(), self.local.clone()),
            SttPreference::Auto => {
                let prefer_local = audio_duration_sec <= self.auto_local_max_sec
                    || self.local.available().await;
                if prefer_local {
                    (self.local.clone(), self.remote.clone())
                } else {
                    (self.remote.clone(), self.local.clone())
                }
            }
        }
    }

    async fn try_adapter(
        &self,
        adapter: &Arc<dyn Transcriber>,
        audio_path: &Path,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Option<Transcript>> {
        if !adapter.available().await {
            return Ok(None);
        }

        match adapter.transcribe(audio_path, language, cancel).await {
            Ok(segments) => {
                let segments = normalize_segments(segments);
                info!(
                    "{} transcriber produced {} segments",
                    adapter.name(),
                    segments.len()
                );
                Ok(Some(Transcript::new(segments)))
            }
            Err(VidereError::Cancelled) => Err(VidereError::Cancelled),
            Err(e) => {
                warn!("{} transcriber failed: {}", adapter.name(), e);
                Ok(None)
            }
        }
    }
}
