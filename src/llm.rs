//! OpenAI-compatible client configuration and response normalization.

use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

use async_openai::{config::OpenAIConfig, Client};

/// Default timeout for LLM API requests (5 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Create an API client with configured timeout.
///
/// Uses a 5-minute timeout by default to prevent hung API calls.
pub fn create_client() -> Client<OpenAIConfig> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an API client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Client<OpenAIConfig> {
    let http_client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client");

    Client::with_config(OpenAIConfig::default()).with_http_client(http_client)
}

/// Check if the API key is configured.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok()
}

/// Strip a Markdown code-fence wrapper from a model response.
///
/// Models regularly wrap JSON payloads in ```json fences despite strict
/// instructions. Returns the inner block when one is found, the trimmed
/// input otherwise.
pub fn strip_code_fences(response: &str) -> String {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)\s*```").expect("valid fence regex")
    });

    match fence.captures(response) {
        Some(caps) => caps[1].trim().to_string(),
        None => response.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        let wrapped = "```json\n[{\"a\": 1}]\n```";
        assert_eq!(strip_code_fences(wrapped), "[{\"a\": 1}]");
    }

    #[test]
    fn test_strip_bare_fence() {
        let wrapped = "```\n{\"b\": 2}\n```";
        assert_eq!(strip_code_fences(wrapped), "{\"b\": 2}");
    }

    #[test]
    fn test_strip_with_prose_around_fence() {
        let wrapped = "Here you go:\n```json\n[]\n```\nHope that helps!";
        assert_eq!(strip_code_fences(wrapped), "[]");
    }

    #[test]
    fn test_unfenced_passthrough() {
        assert_eq!(strip_code_fences("  [1, 2, 3]  "), "[1, 2, 3]");
    }
}
