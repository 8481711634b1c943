//! OpenAI-compatible relevance analyzer.

use super::{RelevanceAnalyzer, RelevantMoment};
use crate::error::{Result, VidereError};
use crate::llm::{create_client, strip_code_fences};
use crate::prompts::ResolvedPrompt;
use crate::transcription::Transcript;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Locates relevant moments with a chat completion over the transcript.
///
/// The chat API takes no video input, so the proxy contributes only its
/// duration here; the transcript (with timestamps) carries the semantic
/// signal. Video-capable adapters can upload the proxy itself.
pub struct OpenAiRelevanceAnalyzer {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAiRelevanceAnalyzer {
    pub fn new(model: &str) -> Self {
        Self {
            client: create_client(),
            model: model.to_string(),
        }
    }

    async fn request_moments(
        &self,
        system: &str,
        user: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(|e| VidereError::RelevanceUnavailable(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user.to_string())
                .build()
                .map_err(|e| VidereError::RelevanceUnavailable(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.1)
            .build()
            .map_err(|e| VidereError::RelevanceUnavailable(e.to_string()))?;

        let chat = self.client.chat();
        let response = tokio::select! {
            result = chat.create(request) => {
                result.map_err(|e| VidereError::Api(format!("relevance request failed: {}", e)))?
            }
            _ = cancel.cancelled() => return Err(VidereError::Cancelled),
        };

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| VidereError::RelevanceUnavailable("empty response".into()))
    }
}

#[async_trait]
impl RelevanceAnalyzer for OpenAiRelevanceAnalyzer {
    #[instrument(skip_all, fields(proxy = %proxy_path.display()))]
    async fn analyze(
        &self,
        proxy_path: &Path,
        transcript: &Transcript,
        keywords: &[String],
        prompt: &ResolvedPrompt,
        duration_sec: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<RelevantMoment>> {
        let keywords_line = if keywords.is_empty() {
            "general technical content".to_string()
        } else {
            keywords.join(", ")
        };

        let transcript_block = if transcript.is_empty() {
            "(no transcript available; rely on the recording length)".to_string()
        } else {
            transcript.format_with_timestamps()
        };

        let user = format!(
            "Recording duration: {:.1} seconds.\nKeywords: {}\n\nTranscript:\n{}",
            duration_sec, keywords_line, transcript_block
        );

        let first = self
            .request_moments(&prompt.system_instruction, &user, cancel)
            .await?;
        if let Some(moments) = parse_moments(&first) {
            debug!("Analyzer returned {} moments", moments.len());
            return Ok(moments);
        }

        warn!("Relevance response was not valid JSON, retrying with reinforcement");
        let reinforced = format!(
            "{}\n\nYour previous reply was not valid JSON. Return strict JSON only: \
             a bare JSON array, no prose, no code fences.",
            prompt.system_instruction
        );

        let second = self.request_moments(&reinforced, &user, cancel).await?;
        match parse_moments(&second) {
            Some(moments) => {
                debug!("Analyzer retry returned {} moments", moments.len());
                Ok(moments)
            }
            None => Err(VidereError::RelevanceUnavailable(
                "invalid JSON after retry".into(),
            )),
        }
    }
}

/// Parse an analyzer response into moments, tolerating fence wrappers and
/// a `{"moments": [...]}` envelope.
fn parse_moments(response: &str) -> Option<Vec<RelevantMoment>> {
    let cleaned = strip_code_fences(response);
    let value: serde_json::Value = serde_json::from_str(&cleaned).ok()?;

    let array = match &value {
        serde_json::Value::Array(_) => value,
        serde_json::Value::Object(map) => map.get("moments").cloned()?,
        _ => return None,
    };

    serde_json::from_value(array).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let response = r#"[{"start_sec": 1.0, "end_sec": 9.0, "reason": "demo"}]"#;
        let moments = parse_moments(response).unwrap();
        assert_eq!(moments.len(), 1);
        assert!(!moments[0].pinned);
    }

    #[test]
    fn test_parse_fenced_envelope() {
        let response = "```json\n{\"moments\": [{\"start_sec\": 0, \"end_sec\": 5, \"reason\": \"x\", \"pinned\": true}]}\n```";
        let moments = parse_moments(response).unwrap();
        assert_eq!(moments.len(), 1);
        assert!(moments[0].pinned);
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(parse_moments("The interesting part starts at 1:30.").is_none());
    }

    #[test]
    fn test_parse_empty_array() {
        assert_eq!(parse_moments("[]").unwrap().len(), 0);
    }
}
