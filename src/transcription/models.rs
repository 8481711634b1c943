//! Transcript data models and normalization.

use serde::{Deserialize, Serialize};

/// A complete transcript with segments.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Transcript {
    /// Individual transcript segments with timestamps.
    pub segments: Vec<TranscriptSegment>,
    /// Total duration covered by segments in seconds.
    pub duration_sec: f64,
}

impl Transcript {
    /// Create a transcript from already-normalized segments.
    pub fn new(segments: Vec<TranscriptSegment>) -> Self {
        let duration_sec = segments.last().map(|s| s.end_sec).unwrap_or(0.0);
        Self {
            segments,
            duration_sec,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Full text (concatenated segments).
    pub fn full_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Get the text content between two timestamps.
    pub fn text_between(&self, start: f64, end: f64) -> String {
        self.segments
            .iter()
            .filter(|s| s.start_sec >= start && s.end_sec <= end)
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format the transcript with timestamps for prompt context.
    pub fn format_with_timestamps(&self) -> String {
        self.segments
            .iter()
            .map(|s| {
                format!(
                    "[{} - {}] {}",
                    format_timestamp(s.start_sec),
                    format_timestamp(s.end_sec),
                    s.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A single segment of a transcript with timestamp information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start_sec: f64,
    /// End time in seconds.
    pub end_sec: f64,
    /// Transcribed text content.
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl TranscriptSegment {
    pub fn new(start_sec: f64, end_sec: f64, text: impl Into<String>) -> Self {
        Self {
            start_sec,
            end_sec,
            text: text.into(),
            speaker: None,
        }
    }

    /// Duration of this segment in seconds.
    pub fn duration(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// Bring adapter output up to the transcript invariants: segments sorted
/// by start, identical-text neighbors merged, overlaps split at the
/// midpoint, degenerate spans dropped.
pub fn normalize_segments(mut segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    segments.retain(|s| !s.text.trim().is_empty() && s.end_sec > s.start_sec && s.start_sec >= 0.0);
    segments.sort_by(|a, b| {
        a.start_sec
            .partial_cmp(&b.start_sec)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut merged: Vec<TranscriptSegment> = Vec::with_capacity(segments.len());
    for seg in segments {
        if let Some(last) = merged.last_mut() {
            // Some engines emit the same line twice across a chunk seam.
            if last.text == seg.text && seg.start_sec <= last.end_sec {
                last.end_sec = last.end_sec.max(seg.end_sec);
                continue;
            }
        }
        merged.push(seg);
    }

    for i in 1..merged.len() {
        if merged[i].start_sec < merged[i - 1].end_sec {
            let midpoint = (merged[i].start_sec + merged[i - 1].end_sec) / 2.0;
            merged[i - 1].end_sec = midpoint;
            merged[i].start_sec = midpoint;
        }
    }

    merged.retain(|s| s.end_sec > s.start_sec);
    merged
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_creation() {
        let segments = vec![
            TranscriptSegment::new(0.0, 5.0, "Hello world"),
            TranscriptSegment::new(5.0, 10.0, "This is a test"),
        ];

        let transcript = Transcript::new(segments);
        assert_eq!(transcript.full_text(), "Hello world This is a test");
        assert_eq!(transcript.duration_sec, 10.0);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(3665.0), "01:01:05");
    }

    #[test]
    fn test_normalize_sorts_and_splits_overlaps() {
        let segments = vec![
            TranscriptSegment::new(6.0, 12.0, "second"),
            TranscriptSegment::new(0.0, 8.0, "first"),
        ];

        let normalized = normalize_segments(segments);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].text, "first");
        // Overlap [6, 8] split at its midpoint.
        assert_eq!(normalized[0].end_sec, 7.0);
        assert_eq!(normalized[1].start_sec, 7.0);
    }

    #[test]
    fn test_normalize_merges_identical_neighbors() {
        let segments = vec![
            TranscriptSegment::new(0.0, 5.0, "same line"),
            TranscriptSegment::new(4.5, 9.0, "same line"),
            TranscriptSegment::new(9.0, 12.0, "different"),
        ];

        let normalized = normalize_segments(segments);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].end_sec, 9.0);
    }

    #[test]
    fn test_normalize_drops_degenerate() {
        let segments = vec![
            TranscriptSegment::new(5.0, 5.0, "zero width"),
            TranscriptSegment::new(3.0, 1.0, "backwards"),
            TranscriptSegment::new(0.0, 2.0, "   "),
            TranscriptSegment::new(0.0, 2.0, "kept"),
        ];

        let normalized = normalize_segments(segments);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].text, "kept");
    }

    #[test]
    fn test_text_between() {
        let transcript = Transcript::new(vec![
            TranscriptSegment::new(0.0, 5.0, "First"),
            TranscriptSegment::new(5.0, 10.0, "Second"),
            TranscriptSegment::new(10.0, 15.0, "Third"),
        ]);
        assert_eq!(transcript.text_between(5.0, 10.0), "Second");
    }
}
