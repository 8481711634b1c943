//! Media capabilities: probing, proxy transcoding, and frame extraction.
//!
//! The pipeline talks to these traits only; the bundled adapters shell out
//! to ffmpeg/ffprobe through `tokio::process`.

mod clips;
mod frames;
mod probe;
mod transcode;

pub use clips::{ClipCutter, ClipFormat};
pub use frames::{keyframe_filename, parse_keyframe_timestamp, FfmpegFrameExtractor};
pub use probe::FfprobeProbe;
pub use transcode::FfmpegTranscoder;

use crate::error::{Result, VidereError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Basic stream facts about an input container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    pub duration_sec: f64,
    pub width: u32,
    pub height: u32,
    pub audio_present: bool,
    /// Container/format name as reported by the prober.
    pub container: String,
}

/// A high-resolution still extracted from the original source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keyframe {
    pub index: usize,
    pub timestamp_sec: f64,
    /// Path relative to the session artifact root.
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Probe a media file for duration and stream layout.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, source: &Path) -> Result<MediaInfo>;
}

/// Produce the low-cost analysis proxy and the speech audio track.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Re-encode `source` to a low-fps, low-resolution proxy in `out_dir`.
    async fn make_proxy(
        &self,
        source: &Path,
        out_dir: &Path,
        fps: u32,
        long_edge_px: u32,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;

    /// Extract a 16 kHz mono WAV from `source` into `out_dir`.
    async fn extract_audio(
        &self,
        source: &Path,
        out_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf>;
}

/// Extract full-resolution stills at specific timestamps.
#[async_trait]
pub trait FrameExtractor: Send + Sync {
    /// Timestamps are clamped to `[0, duration)` by the caller; frames come
    /// back sorted by timestamp with filenames encoding index and time.
    async fn extract(
        &self,
        source: &Path,
        timestamps: &[f64],
        out_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<Keyframe>>;
}

/// Run an external tool to completion, honoring cancellation.
///
/// The child is killed when the cancel token fires or the returned future
/// is dropped, so an abandoned stage cannot leave encoders running.
pub(crate) async fn run_tool(
    mut cmd: Command,
    tool: &str,
    cancel: &CancellationToken,
) -> Result<std::process::Output> {
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(VidereError::ToolNotFound(tool.to_string()));
        }
        Err(e) => {
            return Err(VidereError::ToolFailed(format!(
                "{} failed to start: {}",
                tool, e
            )));
        }
    };

    tokio::select! {
        result = child.wait_with_output() => {
            result.map_err(|e| VidereError::ToolFailed(format!("{}: {}", tool, e)))
        }
        _ = cancel.cancelled() => Err(VidereError::Cancelled),
    }
}

/// Format a tool failure from its captured stderr.
pub(crate) fn tool_error(tool: &str, output: &std::process::Output) -> VidereError {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let detail = stderr.lines().last().unwrap_or("no error output");
    VidereError::ToolFailed(format!("{}: {}", tool, detail))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_tool_missing_binary() {
        let cancel = CancellationToken::new();
        let cmd = Command::new("videre-no-such-tool-xyz");
        let err = run_tool(cmd, "videre-no-such-tool-xyz", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, VidereError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_run_tool_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_tool(cmd, "sleep", &cancel).await.unwrap_err();
        assert!(matches!(err, VidereError::Cancelled));
    }
}
