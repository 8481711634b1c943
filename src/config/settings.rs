//! Configuration settings for Videre.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub limits: LimitSettings,
    pub proxy: ProxySettings,
    pub keyframes: KeyframeSettings,
    pub moments: MomentSettings,
    pub stt: SttSettings,
    pub models: ModelSettings,
    pub timeouts: StageTimeoutSettings,
    pub concurrency: ConcurrencySettings,
    pub segmented: SegmentedSettings,
    pub sessions: SessionSettings,
    pub prompts: PromptSettings,
}


/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for session artifacts and persisted state.
    pub data_dir: String,
    /// Directory for temporary files.
    pub temp_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.videre".to_string(),
            temp_dir: "/tmp/videre".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Input validation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Reject input longer than this many seconds.
    pub max_duration_sec: f64,
    /// Reject input shorter than this many seconds.
    pub min_duration_sec: f64,
    /// Cap on generated markdown payload size in bytes.
    pub max_doc_bytes: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_duration_sec: 900.0, // 15 minutes
            min_duration_sec: 1.0,
            max_doc_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Analysis proxy encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySettings {
    /// Proxy frame rate.
    pub fps: u32,
    /// Proxy long-edge size in pixels.
    pub long_edge_px: u32,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self {
            fps: 1,
            long_edge_px: 640,
        }
    }
}

/// Keyframe extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyframeSettings {
    /// Total keyframe cap per session.
    pub max_keyframes: usize,
    /// Candidate frames per second of moment duration.
    pub density: f64,
}

impl Default for KeyframeSettings {
    fn default() -> Self {
        Self {
            max_keyframes: 25,
            density: 0.2,
        }
    }
}

/// Relevant-moment normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentSettings {
    /// Adjacent moments closer than this are merged.
    pub merge_gap_sec: f64,
    /// Moments shorter than this are dropped unless pinned.
    pub min_segment_sec: f64,
}

impl Default for MomentSettings {
    fn default() -> Self {
        Self {
            merge_gap_sec: 10.0,
            min_segment_sec: 5.0,
        }
    }
}

/// Speech-to-text adapter preference.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SttPreference {
    /// Pick local for short audio or when healthy, remote otherwise.
    #[default]
    Auto,
    /// Local first, remote fallback.
    Fast,
    /// Remote first, local fallback.
    Accurate,
}

impl std::str::FromStr for SttPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(SttPreference::Auto),
            "fast" | "local" => Ok(SttPreference::Fast),
            "accurate" | "remote" => Ok(SttPreference::Accurate),
            _ => Err(format!("Unknown STT preference: {}", s)),
        }
    }
}

impl std::fmt::Display for SttPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SttPreference::Auto => write!(f, "auto"),
            SttPreference::Fast => write!(f, "fast"),
            SttPreference::Accurate => write!(f, "accurate"),
        }
    }
}

/// Speech-to-text settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SttSettings {
    /// Default adapter preference when the caller does not specify one.
    pub preference_default: SttPreference,
    /// Local whisper.cpp binary name or path.
    pub local_binary: String,
    /// Local model file path (passed to the binary when set).
    pub local_model: Option<String>,
    /// Remote transcription model.
    pub remote_model: String,
    /// `auto` picks local when audio is at most this long.
    pub auto_local_max_sec: f64,
}

impl Default for SttSettings {
    fn default() -> Self {
        Self {
            preference_default: SttPreference::Auto,
            local_binary: "whisper-cli".to_string(),
            local_model: None,
            remote_model: "whisper-1".to_string(),
            auto_local_max_sec: 300.0, // 5 minutes
        }
    }
}

/// LLM model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Fast model for relevance analysis and speed-preferring modes.
    pub fast: String,
    /// Quality model for documentation generation.
    pub quality: String,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            fast: "gpt-4o-mini".to_string(),
            quality: "gpt-4o".to_string(),
        }
    }
}

/// Per-stage timeout budgets in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeoutSettings {
    pub probe_sec: u64,
    pub proxy_sec: u64,
    pub transcribe_sec: u64,
    pub relevance_sec: u64,
    pub extract_sec: u64,
    pub generate_sec: u64,
}

impl Default for StageTimeoutSettings {
    fn default() -> Self {
        Self {
            probe_sec: 5,
            proxy_sec: 120,
            transcribe_sec: 600,
            relevance_sec: 60,
            extract_sec: 120,
            generate_sec: 180,
        }
    }
}

/// Admission caps for external adapters and sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencySettings {
    /// Concurrent sessions (0 = number of CPUs).
    pub max_sessions: usize,
    pub transcoder: usize,
    pub stt: usize,
    pub relevance: usize,
    pub generator: usize,
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            max_sessions: 0,
            transcoder: 2,
            stt: 2,
            relevance: 4,
            generator: 2,
        }
    }
}

/// Segmented pipeline variant settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentedSettings {
    /// Fixed chunk length in seconds.
    pub chunk_sec: f64,
    /// Upper bound on concurrent chunk tasks.
    pub max_parallel_chunks: usize,
}

impl Default for SegmentedSettings {
    fn default() -> Self {
        Self {
            chunk_sec: 30.0,
            max_parallel_chunks: 4,
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Running sessions with no heartbeat for this long are failed.
    pub stale_session_sec: u64,
    /// Zombie sweep interval.
    pub sweep_interval_sec: u64,
    /// Inactive sessions are evicted from memory after this long.
    pub retention_sec_memory: u64,
    /// On-disk retention (unset = keep forever).
    pub retention_sec_disk: Option<u64>,
    /// Adapters must abandon work this quickly after a cancel signal.
    pub grace_window_sec: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            stale_session_sec: 600,
            sweep_interval_sec: 60,
            retention_sec_memory: 3600,
            retention_sec_disk: None,
            grace_window_sec: 5,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompt records (overrides built-ins).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as ${variable_name}.
    pub variables: std::collections::HashMap<String, String>,
}


impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::VidereError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("videre")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded data directory path.
    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    /// Get the expanded temp directory path.
    pub fn temp_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.temp_dir)
    }

    /// Session artifact root (one subdirectory per session).
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir().join("sessions")
    }

    /// Effective concurrent-session cap.
    pub fn max_sessions(&self) -> usize {
        if self.concurrency.max_sessions > 0 {
            self.concurrency.max_sessions
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.limits.max_duration_sec, 900.0);
        assert_eq!(settings.proxy.fps, 1);
        assert_eq!(settings.proxy.long_edge_px, 640);
        assert_eq!(settings.keyframes.max_keyframes, 25);
        assert_eq!(settings.moments.merge_gap_sec, 10.0);
        assert_eq!(settings.moments.min_segment_sec, 5.0);
        assert_eq!(settings.sessions.stale_session_sec, 600);
        assert_eq!(settings.segmented.chunk_sec, 30.0);
    }

    #[test]
    fn test_stt_preference_parse() {
        assert_eq!("auto".parse::<SttPreference>().unwrap(), SttPreference::Auto);
        assert_eq!("fast".parse::<SttPreference>().unwrap(), SttPreference::Fast);
        assert_eq!(
            "accurate".parse::<SttPreference>().unwrap(),
            SttPreference::Accurate
        );
        assert!("instant".parse::<SttPreference>().is_err());
    }

    #[test]
    fn test_partial_toml_roundtrip() {
        let toml_src = r#"
            [limits]
            max_duration_sec = 120.0

            [stt]
            preference_default = "accurate"
        "#;
        let settings: Settings = toml::from_str(toml_src).unwrap();
        assert_eq!(settings.limits.max_duration_sec, 120.0);
        assert_eq!(settings.stt.preference_default, SttPreference::Accurate);
        // Untouched sections keep their defaults
        assert_eq!(settings.keyframes.max_keyframes, 25);
    }
}
