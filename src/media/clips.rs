//! Social clip cutting for the clip-generator mode.

use super::{run_tool, tool_error};
use crate::error::{Result, VidereError};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Aspect treatment for an exported clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClipFormat {
    /// 9:16 center crop for shorts/reels.
    #[default]
    Vertical,
    /// 1:1 center crop.
    Square,
    /// Source aspect, no crop.
    Horizontal,
}

impl ClipFormat {
    fn crop_filter(self) -> Option<&'static str> {
        match self {
            ClipFormat::Vertical => Some("crop=ih*(9/16):ih:(iw-ow)/2:0"),
            ClipFormat::Square => Some("crop=ih:ih:(iw-ow)/2:0"),
            ClipFormat::Horizontal => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            ClipFormat::Vertical => "vertical",
            ClipFormat::Square => "square",
            ClipFormat::Horizontal => "horizontal",
        }
    }
}

/// Cuts short clips out of the original source for publishing.
pub struct ClipCutter {
    binary: String,
}

impl ClipCutter {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }

    /// Cut `[start_sec, end_sec)` out of `source` into `out_dir`.
    #[instrument(skip(self, cancel), fields(source = %source.display()))]
    pub async fn cut(
        &self,
        source: &Path,
        start_sec: f64,
        end_sec: f64,
        format: ClipFormat,
        out_dir: &Path,
        index: usize,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        let duration = end_sec - start_sec;
        if duration <= 0.0 {
            return Err(VidereError::InputInvalid(
                "clip end must be after clip start".into(),
            ));
        }

        std::fs::create_dir_all(out_dir)?;
        let dest = out_dir.join(format!("clip_{:02}_{}.mp4", index, format.tag()));

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-ss").arg(format!("{:.3}", start_sec))
            .arg("-i").arg(source)
            .arg("-t").arg(format!("{:.3}", duration))
            .arg("-c:v").arg("libx264")
            .arg("-c:a").arg("aac");
        if let Some(filter) = format.crop_filter() {
            cmd.arg("-vf").arg(filter);
        }
        cmd.arg("-y").arg("-loglevel").arg("error").arg(&dest);

        let output = run_tool(cmd, &self.binary, cancel).await?;
        if !output.status.success() || !dest.exists() {
            return Err(tool_error(&self.binary, &output));
        }

        info!("Clip {} written to {}", index, dest.display());
        Ok(dest)
    }
}

impl Default for ClipCutter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_filters() {
        assert!(ClipFormat::Vertical.crop_filter().unwrap().contains("9/16"));
        assert!(ClipFormat::Square.crop_filter().is_some());
        assert!(ClipFormat::Horizontal.crop_filter().is_none());
    }
}
