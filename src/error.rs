//! Error types for Videre.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Library-level error type for Videre operations.
#[derive(Error, Debug)]
pub enum VidereError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InputInvalid(String),

    #[error("Input too large: {0}")]
    InputTooLarge(String),

    #[error("Preprocessing failed: {0}")]
    PreprocessingFailed(String),

    #[error("Transcription required but unavailable: {0}")]
    TranscriptionRequired(String),

    #[error("Transcription unavailable: {0}")]
    TranscriptionUnavailable(String),

    #[error("Relevance analysis unavailable: {0}")]
    RelevanceUnavailable(String),

    #[error("Frame extraction failed: {0}")]
    FrameExtractionFailed(String),

    #[error("Generated output does not match declared format: {0}")]
    OutputFormatInvalid(String),

    #[error("Stage '{stage}' exceeded its {budget_sec}s budget")]
    StageTimeout { stage: String, budget_sec: u64 },

    #[error("Cancelled")]
    Cancelled,

    #[error("Session went stale: {0}")]
    StaleTimeout(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Artifact store error: {0}")]
    Store(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("LLM API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stable error classification surfaced to callers and persisted with
/// failed sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InputInvalid,
    InputTooLarge,
    PreprocessingFailed,
    TranscriptionRequired,
    TranscriptionUnavailable,
    RelevanceUnavailable,
    FrameExtractionFailed,
    OutputFormatInvalid,
    StageTimeout,
    Cancelled,
    StaleTimeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InputInvalid => "input_invalid",
            ErrorKind::InputTooLarge => "input_too_large",
            ErrorKind::PreprocessingFailed => "preprocessing_failed",
            ErrorKind::TranscriptionRequired => "transcription_required",
            ErrorKind::TranscriptionUnavailable => "transcription_unavailable",
            ErrorKind::RelevanceUnavailable => "relevance_unavailable",
            ErrorKind::FrameExtractionFailed => "frame_extraction_failed",
            ErrorKind::OutputFormatInvalid => "output_format_invalid",
            ErrorKind::StageTimeout => "stage_timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::StaleTimeout => "stale_timeout",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl VidereError {
    /// Classify this error into the stable taxonomy.
    ///
    /// Infrastructure errors (IO, JSON, config, tool failures) that escape
    /// a stage without being reclassified at the adapter boundary count as
    /// internal errors.
    pub fn kind(&self) -> ErrorKind {
        match self {
            VidereError::InputInvalid(_) => ErrorKind::InputInvalid,
            VidereError::InputTooLarge(_) => ErrorKind::InputTooLarge,
            VidereError::PreprocessingFailed(_) => ErrorKind::PreprocessingFailed,
            VidereError::TranscriptionRequired(_) => ErrorKind::TranscriptionRequired,
            VidereError::TranscriptionUnavailable(_) => ErrorKind::TranscriptionUnavailable,
            VidereError::RelevanceUnavailable(_) => ErrorKind::RelevanceUnavailable,
            VidereError::FrameExtractionFailed(_) => ErrorKind::FrameExtractionFailed,
            VidereError::OutputFormatInvalid(_) => ErrorKind::OutputFormatInvalid,
            VidereError::StageTimeout { .. } => ErrorKind::StageTimeout,
            VidereError::Cancelled => ErrorKind::Cancelled,
            VidereError::StaleTimeout(_) => ErrorKind::StaleTimeout,
            _ => ErrorKind::Internal,
        }
    }

    /// Process exit code for CLI hosts.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::InputInvalid | ErrorKind::InputTooLarge => 2,
            ErrorKind::Cancelled => 4,
            ErrorKind::StageTimeout | ErrorKind::StaleTimeout => 5,
            _ => 3,
        }
    }
}

/// Structured failure record persisted with a failed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub stage: String,
    pub session_id: String,
}

/// Result type alias for Videre operations.
pub type Result<T> = std::result::Result<T, VidereError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            VidereError::InputTooLarge("20m".into()).kind(),
            ErrorKind::InputTooLarge
        );
        assert_eq!(VidereError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            VidereError::ToolFailed("ffmpeg".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(VidereError::InputInvalid("x".into()).exit_code(), 2);
        assert_eq!(VidereError::Cancelled.exit_code(), 4);
        assert_eq!(
            VidereError::StageTimeout {
                stage: "probe".into(),
                budget_sec: 5
            }
            .exit_code(),
            5
        );
        assert_eq!(
            VidereError::PreprocessingFailed("no proxy".into()).exit_code(),
            3
        );
    }
}
