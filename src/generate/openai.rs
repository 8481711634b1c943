//! OpenAI-compatible multimodal document generator.

use super::Generator;
use crate::error::{Result, VidereError};
use crate::llm::create_client;
use crate::media::Keyframe;
use crate::prompts::{ModelPreference, ResolvedPrompt};
use crate::transcription::Transcript;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Generates documents from keyframes and the transcript with a chat
/// completion; frames travel as base64 data-URL image parts.
pub struct OpenAiGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    fast_model: String,
    quality_model: String,
}

impl OpenAiGenerator {
    pub fn new(fast_model: &str, quality_model: &str) -> Self {
        Self {
            client: create_client(),
            fast_model: fast_model.to_string(),
            quality_model: quality_model.to_string(),
        }
    }

    fn model_for(&self, prompt: &ResolvedPrompt) -> &str {
        match prompt.record.model_preference {
            ModelPreference::Fast => &self.fast_model,
            ModelPreference::Quality => &self.quality_model,
        }
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    #[instrument(skip_all, fields(mode = %prompt.record.id, frames = keyframes.len()))]
    async fn generate(
        &self,
        prompt: &ResolvedPrompt,
        keyframes: &[Keyframe],
        artifact_root: &Path,
        transcript: &Transcript,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        let mut system = prompt.system_instruction.clone();
        if !prompt.guidelines.is_empty() {
            system.push_str("\n\nGuidelines:\n");
            for guideline in &prompt.guidelines {
                system.push_str("- ");
                system.push_str(guideline);
                system.push('\n');
            }
        }

        let mut user_text = String::new();
        if !transcript.is_empty() {
            user_text.push_str("Audio transcript:\n");
            user_text.push_str(&transcript.format_with_timestamps());
            user_text.push_str("\n\n");
        }
        user_text.push_str(&format!(
            "Visual frames: {} screenshots follow, in chronological order. \
             Frame N is the Nth image; its capture time in seconds is part of its label.",
            keyframes.len()
        ));

        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();
        parts.push(
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(user_text)
                .build()
                .map_err(|e| VidereError::Api(e.to_string()))?
                .into(),
        );

        for keyframe in keyframes {
            let frame_path = artifact_root.join(&keyframe.path);
            let bytes = match tokio::fs::read(&frame_path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping unreadable frame {}: {}", frame_path.display(), e);
                    continue;
                }
            };

            let data_url = format!(
                "data:image/jpeg;base64,{}",
                BASE64_STANDARD.encode(&bytes)
            );
            parts.push(
                ChatCompletionRequestMessageContentPartTextArgs::default()
                    .text(format!(
                        "Frame {} (t={:.1}s):",
                        keyframe.index + 1,
                        keyframe.timestamp_sec
                    ))
                    .build()
                    .map_err(|e| VidereError::Api(e.to_string()))?
                    .into(),
            );
            parts.push(
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(
                        ImageUrlArgs::default()
                            .url(data_url)
                            .detail(ImageDetail::Auto)
                            .build()
                            .map_err(|e| VidereError::Api(e.to_string()))?,
                    )
                    .build()
                    .map_err(|e| VidereError::Api(e.to_string()))?
                    .into(),
            );
        }

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| VidereError::Api(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(parts)
                .build()
                .map_err(|e| VidereError::Api(e.to_string()))?
                .into(),
        ];

        let model = self.model_for(prompt);
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.4)
            .max_tokens(MAX_OUTPUT_TOKENS)
            .build()
            .map_err(|e| VidereError::Api(e.to_string()))?;

        info!("Requesting {} generation from {}", prompt.record.id, model);

        let chat = self.client.chat();
        let response = tokio::select! {
            result = chat.create(request) => {
                result.map_err(|e| VidereError::Api(format!("generation failed: {}", e)))?
            }
            _ = cancel.cancelled() => return Err(VidereError::Cancelled),
        };

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| VidereError::Api("empty generation response".into()))?;

        debug!("Generated {} characters", content.len());
        Ok(content.into_bytes())
    }
}
