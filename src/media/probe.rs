//! ffprobe-backed media probing.

use super::{run_tool, MediaInfo, MediaProbe};
use crate::error::{Result, VidereError};
use async_trait::async_trait;
use std::path::Path;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Probes containers with `ffprobe -print_format json`.
pub struct FfprobeProbe {
    binary: String,
}

impl FfprobeProbe {
    pub fn new() -> Self {
        Self {
            binary: "ffprobe".to_string(),
        }
    }
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    #[instrument(skip(self), fields(source = %source.display()))]
    async fn probe(&self, source: &Path) -> Result<MediaInfo> {
        if !source.exists() {
            return Err(VidereError::InputInvalid(format!(
                "source does not exist: {}",
                source.display()
            )));
        }

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-v").arg("quiet")
            .arg("-print_format").arg("json")
            .arg("-show_format")
            .arg("-show_streams")
            .arg(source);

        // Probing is quick; it runs under the stage timeout rather than a
        // cancellation handle.
        let output = run_tool(cmd, &self.binary, &CancellationToken::new()).await?;
        if !output.status.success() {
            return Err(VidereError::InputInvalid(format!(
                "unreadable container: {}",
                source.display()
            )));
        }

        let parsed: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|_| VidereError::InputInvalid("invalid ffprobe output".into()))?;

        let duration_sec = parsed["format"]["duration"]
            .as_str()
            .and_then(|s| s.parse::<f64>().ok())
            .ok_or_else(|| {
                VidereError::InputInvalid("could not determine media duration".into())
            })?;

        let container = parsed["format"]["format_name"]
            .as_str()
            .unwrap_or("unknown")
            .to_string();

        let streams = parsed["streams"].as_array().cloned().unwrap_or_default();

        let video = streams
            .iter()
            .find(|s| s["codec_type"].as_str() == Some("video"));
        let (width, height) = video
            .map(|s| {
                (
                    s["width"].as_u64().unwrap_or(0) as u32,
                    s["height"].as_u64().unwrap_or(0) as u32,
                )
            })
            .unwrap_or((0, 0));

        if video.is_none() {
            return Err(VidereError::InputInvalid(format!(
                "no video stream in {}",
                source.display()
            )));
        }

        let audio_present = streams
            .iter()
            .any(|s| s["codec_type"].as_str() == Some("audio"));

        debug!(
            duration_sec,
            width, height, audio_present, "Probed media source"
        );

        Ok(MediaInfo {
            duration_sec,
            width,
            height,
            audio_present,
            container,
        })
    }
}
