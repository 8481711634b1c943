//! Relevance analysis: locating the moments worth visualizing.

mod openai;

pub use openai::OpenAiRelevanceAnalyzer;

use crate::error::Result;
use crate::prompts::ResolvedPrompt;
use crate::transcription::Transcript;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// A `[start, end]` interval the analyzer deems worth visualizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelevantMoment {
    pub start_sec: f64,
    pub end_sec: f64,
    /// Short rationale, at most a few words.
    pub reason: String,
    /// Pinned moments survive the minimum-span filter.
    #[serde(default)]
    pub pinned: bool,
}

impl RelevantMoment {
    pub fn duration(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// The degenerate whole-video moment used when analysis yields nothing.
pub fn fallback_moment(duration_sec: f64) -> RelevantMoment {
    RelevantMoment {
        start_sec: 0.0,
        end_sec: duration_sec,
        reason: "fallback".to_string(),
        pinned: false,
    }
}

/// Trait for relevance analyzers.
#[async_trait]
pub trait RelevanceAnalyzer: Send + Sync {
    /// Analyze the proxy video and transcript for relevant moments.
    ///
    /// Returns the raw (pre-normalization) moments. Adapters that cannot
    /// produce valid output after their internal retry fail with
    /// `RelevanceUnavailable`; the pipeline degrades to the whole-video
    /// fallback.
    async fn analyze(
        &self,
        proxy_path: &Path,
        transcript: &Transcript,
        keywords: &[String],
        prompt: &ResolvedPrompt,
        duration_sec: f64,
        cancel: &CancellationToken,
    ) -> Result<Vec<RelevantMoment>>;
}

/// Normalize analyzer output: sort, clamp to `[0, duration]`, drop spans
/// under `min_span_sec` unless pinned, then merge neighbors closer than
/// `merge_gap_sec`.
pub fn normalize_moments(
    moments: Vec<RelevantMoment>,
    duration_sec: f64,
    merge_gap_sec: f64,
    min_span_sec: f64,
) -> Vec<RelevantMoment> {
    let mut clamped: Vec<RelevantMoment> = moments
        .into_iter()
        .filter_map(|mut m| {
            m.start_sec = m.start_sec.clamp(0.0, duration_sec);
            m.end_sec = m.end_sec.clamp(0.0, duration_sec);
            (m.end_sec > m.start_sec).then_some(m)
        })
        .collect();

    clamped.sort_by(|a, b| {
        a.start_sec
            .partial_cmp(&b.start_sec)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    clamped.retain(|m| m.pinned || m.duration() >= min_span_sec);

    let mut merged: Vec<RelevantMoment> = Vec::with_capacity(clamped.len());
    for moment in clamped {
        match merged.last_mut() {
            Some(last) if moment.start_sec - last.end_sec < merge_gap_sec => {
                last.end_sec = last.end_sec.max(moment.end_sec);
                last.pinned = last.pinned || moment.pinned;
            }
            _ => merged.push(moment),
        }
    }

    merged
}
