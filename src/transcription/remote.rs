//! Accurate remote transcription via an OpenAI-compatible Whisper API.

use super::{Transcriber, TranscriptSegment};
use crate::error::{Result, VidereError};
use crate::llm::create_client;
use async_openai::types::{AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

/// Remote Whisper-based transcriber.
pub struct RemoteWhisperTranscriber {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl RemoteWhisperTranscriber {
    pub fn new(model: &str) -> Self {
        Self {
            client: create_client(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl Transcriber for RemoteWhisperTranscriber {
    fn name(&self) -> &str {
        "remote"
    }

    async fn available(&self) -> bool {
        std::env::var("OPENAI_API_KEY").is_ok()
    }

    #[instrument(skip(self, cancel), fields(audio_path = %audio_path.display()))]
    async fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TranscriptSegment>> {
        let file_bytes = tokio::fs::read(audio_path).await?;

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(async_openai::types::AudioInput::from_vec_u8(
                audio_path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("audio.wav")
                    .to_string(),
                file_bytes,
            ))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson);

        if let Some(lang) = language {
            request_builder.language(lang);
        }

        let request = request_builder
            .build()
            .map_err(|e| VidereError::TranscriptionUnavailable(format!("bad request: {}", e)))?;

        let audio = self.client.audio();
        let response = tokio::select! {
            result = audio.transcribe_verbose_json(request) => {
                result.map_err(|e| VidereError::Api(format!("Whisper API error: {}", e)))?
            }
            _ = cancel.cancelled() => return Err(VidereError::Cancelled),
        };

        // Parse segments from verbose JSON; fall back to one segment of
        // the full text when the API omits them.
        let segments: Vec<TranscriptSegment> = response
            .segments
            .map(|segs| {
                segs.iter()
                    .map(|s| {
                        TranscriptSegment::new(s.start as f64, s.end as f64, s.text.trim())
                    })
                    .collect()
            })
            .unwrap_or_else(|| {
                vec![TranscriptSegment::new(
                    0.0,
                    response.duration as f64,
                    response.text.trim(),
                )]
            });

        debug!("Remote transcription produced {} segments", segments.len());
        Ok(segments)
    }
}
