//! Document generation: the second LLM pass that writes the final payload.

mod openai;

pub use openai::OpenAiGenerator;

use crate::error::{Result, VidereError};
use crate::llm::strip_code_fences;
use crate::media::Keyframe;
use crate::prompts::{PromptOutputFormat, ResolvedPrompt};
use crate::transcription::Transcript;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// The final document produced for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocPayload {
    pub format: PromptOutputFormat,
    /// Markdown text, or a normalized JSON document.
    pub content: String,
}

impl DocPayload {
    /// Artifact file name for this payload.
    pub fn artifact_name(&self) -> &'static str {
        match self.format {
            PromptOutputFormat::Markdown => "doc.md",
            PromptOutputFormat::Json => "doc.json",
        }
    }
}

/// Trait for document generators.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the raw document bytes for the mode's prompt.
    ///
    /// Keyframe paths are relative to `artifact_root`. Implementations
    /// must honor the cancel token and return `Cancelled` without partial
    /// work.
    async fn generate(
        &self,
        prompt: &ResolvedPrompt,
        keyframes: &[Keyframe],
        artifact_root: &Path,
        transcript: &Transcript,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>>;
}

/// Validate generator output against the record's declared format.
///
/// JSON payloads must parse as UTF-8 JSON after code-fence stripping and
/// are stored re-serialized; markdown payloads only have to be UTF-8 and
/// under the size cap.
pub fn validate_payload(
    bytes: Vec<u8>,
    format: PromptOutputFormat,
    max_bytes: usize,
) -> Result<DocPayload> {
    let text = String::from_utf8(bytes)
        .map_err(|_| VidereError::OutputFormatInvalid("payload is not UTF-8".into()))?;

    if text.len() > max_bytes {
        return Err(VidereError::OutputFormatInvalid(format!(
            "payload is {} bytes, cap is {}",
            text.len(),
            max_bytes
        )));
    }

    match format {
        PromptOutputFormat::Markdown => Ok(DocPayload {
            format,
            content: text,
        }),
        PromptOutputFormat::Json => {
            let cleaned = strip_code_fences(&text);
            let value: serde_json::Value = serde_json::from_str(&cleaned).map_err(|e| {
                VidereError::OutputFormatInvalid(format!("payload is not valid JSON: {}", e))
            })?;
            Ok(DocPayload {
                format,
                content: serde_json::to_string_pretty(&value)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_markdown() {
        let payload =
            validate_payload(b"# Title\n\nBody".to_vec(), PromptOutputFormat::Markdown, 1024)
                .unwrap();
        assert_eq!(payload.content, "# Title\n\nBody");
        assert_eq!(payload.artifact_name(), "doc.md");
    }

    #[test]
    fn test_validate_markdown_size_cap() {
        let err = validate_payload(vec![b'a'; 100], PromptOutputFormat::Markdown, 10).unwrap_err();
        assert!(matches!(err, VidereError::OutputFormatInvalid(_)));
    }

    #[test]
    fn test_validate_json_strips_fences() {
        let raw = b"```json\n[{\"scene_number\": 1}]\n```".to_vec();
        let payload = validate_payload(raw, PromptOutputFormat::Json, 1024).unwrap();
        assert!(payload.content.starts_with('['));
        assert_eq!(payload.artifact_name(), "doc.json");
    }

    #[test]
    fn test_validate_json_rejects_prose() {
        let err = validate_payload(
            b"Sure! Here are the scenes you asked for.".to_vec(),
            PromptOutputFormat::Json,
            1024,
        )
        .unwrap_err();
        assert!(matches!(err, VidereError::OutputFormatInvalid(_)));
    }

    #[test]
    fn test_validate_rejects_non_utf8() {
        let err = validate_payload(vec![0xff, 0xfe], PromptOutputFormat::Markdown, 1024).unwrap_err();
        assert!(matches!(err, VidereError::OutputFormatInvalid(_)));
    }
}
