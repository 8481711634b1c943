//! Fast local transcription via the whisper.cpp CLI.

use super::{Transcriber, TranscriptSegment};
use crate::error::{Result, VidereError};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Runs a local whisper.cpp binary and parses its JSON output.
///
/// The binary is probed lazily on the first `available()` call and the
/// answer is cached, so later health checks are effectively free.
pub struct LocalWhisperTranscriber {
    binary: String,
    model_path: Option<String>,
    availability: OnceCell<bool>,
}

impl LocalWhisperTranscriber {
    pub fn new(binary: &str, model_path: Option<&str>) -> Self {
        Self {
            binary: binary.to_string(),
            model_path: model_path.map(|s| s.to_string()),
            availability: OnceCell::new(),
        }
    }

    async fn self_test(&self) -> bool {
        let result = Command::new(&self.binary)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(_) => {
                info!("Local transcriber ready ({})", self.binary);
                true
            }
            Err(e) => {
                warn!("Local transcriber unavailable: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl Transcriber for LocalWhisperTranscriber {
    fn name(&self) -> &str {
        "local"
    }

    async fn available(&self) -> bool {
        *self.availability.get_or_init(|| self.self_test()).await
    }

    #[instrument(skip(self, cancel), fields(audio_path = %audio_path.display()))]
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptSegment>> {
        let out_dir = tempfile::tempdir()?;
        let out_prefix = out_dir.path().join("transcript");

        let mut cmd = Command::new(&self.binary);
        if let Some(model) = &self.model_path {
            cmd.arg("-m").arg(model);
        }
        cmd.arg("-f").arg(audio_path)
            .arg("--output-json")
            .arg("--output-file").arg(&out_prefix)
            .arg("--no-prints");
        if let Some(lang) = language {
            cmd.arg("-l").arg(lang);
        }
        cmd.stdout(Stdio::null()).stderr(Stdio::piped()).kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VidereError::ToolNotFound(self.binary.clone())
            } else {
                VidereError::TranscriptionUnavailable(e.to_string())
            }
        })?;

        let output = tokio::select! {
            result = child.wait_with_output() => {
                result.map_err(|e| VidereError::TranscriptionUnavailable(e.to_string()))?
            }
            _ = cancel.cancelled() => return Err(VidereError::Cancelled),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VidereError::TranscriptionUnavailable(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.lines().last().unwrap_or("")
            )));
        }

        let json_path = out_prefix.with_extension("json");
        let content = std::fs::read_to_string(&json_path).map_err(|e| {
            VidereError::TranscriptionUnavailable(format!("missing transcript output: {}", e))
        })?;

        let segments = parse_whisper_cpp_json(&content)?;
        debug!("Local transcription produced {} segments", segments.len());
        Ok(segments)
    }
}

/// Parse whisper.cpp's JSON output shape:
/// `{"transcription": [{"offsets": {"from": ms, "to": ms}, "text": "..."}]}`.
fn parse_whisper_cpp_json(content: &str) -> Result<Vec<TranscriptSegment>> {
    let parsed: serde_json::Value = serde_json::from_str(content)
        .map_err(|e| VidereError::TranscriptionUnavailable(format!("invalid JSON output: {}", e)))?;

    let entries = parsed["transcription"].as_array().ok_or_else(|| {
        VidereError::TranscriptionUnavailable("missing 'transcription' array".into())
    })?;

    let segments = entries
        .iter()
        .filter_map(|entry| {
            let from_ms = entry["offsets"]["from"].as_f64()?;
            let to_ms = entry["offsets"]["to"].as_f64()?;
            let text = entry["text"].as_str()?.trim();
            if text.is_empty() {
                return None;
            }
            Some(TranscriptSegment::new(
                from_ms / 1000.0,
                to_ms / 1000.0,
                text,
            ))
        })
        .collect();

    Ok(segments)
}
