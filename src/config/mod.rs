//! Configuration management for Videre.

mod settings;

pub use settings::{
    ConcurrencySettings, GeneralSettings, KeyframeSettings, LimitSettings, ModelSettings,
    MomentSettings, PromptSettings, ProxySettings, SegmentedSettings, SessionSettings, Settings,
    StageTimeoutSettings, SttPreference, SttSettings,
};
