//! ffmpeg proxy and audio extraction.

use super::{run_tool, tool_error, Transcoder};
use crate::error::{Result, VidereError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Produces analysis proxies and speech audio with ffmpeg.
pub struct FfmpegTranscoder {
    binary: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
        }
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    /// Re-encode to a low-fps proxy: dropped frame rate, scaled long edge,
    /// aggressive compression, no audio. The proxy exists purely to make
    /// multimodal analysis cheap.
    #[instrument(skip(self, cancel), fields(source = %source.display()))]
    async fn make_proxy(
        &self,
        source: &Path,
        out_dir: &Path,
        fps: u32,
        long_edge_px: u32,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(out_dir)?;
        let proxy_path = out_dir.join("proxy.mp4");

        info!("Creating {} fps proxy", fps);

        // scale=<edge>:-2 keeps the aspect ratio with an even height.
        let mut cmd = Command::new(&self.binary);
        cmd.arg("-i").arg(source)
            .arg("-filter:v").arg(format!("fps={},scale={}:-2", fps, long_edge_px))
            .arg("-c:v").arg("libx264")
            .arg("-crf").arg("28")
            .arg("-preset").arg("veryfast")
            .arg("-an")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg(&proxy_path);

        let output = run_tool(cmd, &self.binary, cancel).await?;
        if !output.status.success() || !proxy_path.exists() {
            return Err(VidereError::PreprocessingFailed(
                tool_error(&self.binary, &output).to_string(),
            ));
        }

        debug!("Proxy created at {}", proxy_path.display());
        Ok(proxy_path)
    }

    /// Extract the audio track as 16 kHz mono WAV, the rate speech models
    /// expect.
    #[instrument(skip(self, cancel), fields(source = %source.display()))]
    async fn extract_audio(
        &self,
        source: &Path,
        out_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(out_dir)?;
        let audio_path = out_dir.join("audio.wav");

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-i").arg(source)
            .arg("-vn")
            .arg("-acodec").arg("pcm_s16le")
            .arg("-ar").arg("16000")
            .arg("-ac").arg("1")
            .arg("-y")
            .arg("-loglevel").arg("error")
            .arg(&audio_path);

        let output = run_tool(cmd, &self.binary, cancel).await?;
        if !output.status.success() || !audio_path.exists() {
            return Err(VidereError::PreprocessingFailed(
                tool_error(&self.binary, &output).to_string(),
            ));
        }

        debug!("Audio extracted to {}", audio_path.display());
        Ok(audio_path)
    }
}
