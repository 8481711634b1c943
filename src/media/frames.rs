//! Full-resolution keyframe extraction with ffmpeg.

use super::{run_tool, tool_error, FrameExtractor, Keyframe};
use crate::error::{Result, VidereError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Build the canonical frame filename, e.g. `frame_0003_t12.5s.jpg`.
///
/// Downstream consumers reconstruct the timestamp from the name, so the
/// format is part of the artifact contract.
pub fn keyframe_filename(index: usize, timestamp_sec: f64) -> String {
    format!("frame_{:04}_t{:.1}s.jpg", index, timestamp_sec)
}

/// Recover the timestamp encoded in a frame filename.
pub fn parse_keyframe_timestamp(filename: &str) -> Option<f64> {
    let t_part = filename.split("_t").nth(1)?;
    let seconds = t_part.strip_suffix("s.jpg")?;
    seconds.parse::<f64>().ok()
}

/// Extracts one full-resolution JPEG per requested timestamp.
pub struct FfmpegFrameExtractor {
    binary: String,
}

impl FfmpegFrameExtractor {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    async fn extract_one(
        &self,
        source: &Path,
        timestamp: f64,
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // -ss before -i for fast keyframe seeking.
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-ss").arg(format!("{:.3}", timestamp))
            .arg("-i").arg(source)
            .arg("-frames:v").arg("1")
            .arg("-q:v").arg("2")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg(dest);

        let output = run_tool(cmd, &self.binary, cancel).await?;
        if !output.status.success() || !dest.exists() {
            return Err(tool_error(&self.binary, &output));
        }
        Ok(())
    }
}

impl Default for FfmpegFrameExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameExtractor for FfmpegFrameExtractor {
    #[instrument(skip(self, timestamps, cancel), fields(source = %source.display(), count = timestamps.len()))]
    async fn extract(
        &self,
        source: &Path,
        timestamps: &[f64],
        out_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Vec<Keyframe>> {
        std::fs::create_dir_all(out_dir)?;

        let mut sorted: Vec<f64> = timestamps.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut frames = Vec::with_capacity(sorted.len());
        let mut failures = 0usize;

        for (index, &timestamp) in sorted.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(VidereError::Cancelled);
            }

            let filename = keyframe_filename(index, timestamp);
            let dest = out_dir.join(&filename);

            match self.extract_one(source, timestamp, &dest, cancel).await {
                Ok(()) => {
                    debug!("Extracted frame {} at {:.2}s", index, timestamp);
                    frames.push(Keyframe {
                        index,
                        timestamp_sec: timestamp,
                        path: PathBuf::from("frames").join(filename),
                        label: None,
                    });
                }
                Err(VidereError::Cancelled) => return Err(VidereError::Cancelled),
                Err(e) => {
                    // A seek past the last packet can come back empty;
                    // tolerate individual misses.
                    warn!("Frame at {:.2}s failed: {}", timestamp, e);
                    failures += 1;
                }
            }
        }

        if frames.is_empty() && !sorted.is_empty() {
            return Err(VidereError::FrameExtractionFailed(format!(
                "all {} frame extractions failed",
                failures
            )));
        }

        Ok(frames)
    }
}
