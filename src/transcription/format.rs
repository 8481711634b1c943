//! Transcript output formatting (JSON, SRT, VTT).
//!
//! SRT rendering doubles as the document payload for the subtitle
//! extraction mode.

use super::Transcript;

/// Supported transcript export formats.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TranscriptFormat {
    Json,
    Srt,
    Vtt,
}

impl std::str::FromStr for TranscriptFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(TranscriptFormat::Json),
            "srt" => Ok(TranscriptFormat::Srt),
            "vtt" | "webvtt" => Ok(TranscriptFormat::Vtt),
            _ => Err(format!("Unknown format: {}. Use json, srt, or vtt.", s)),
        }
    }
}

/// Format a transcript for output.
pub fn format_transcript(transcript: &Transcript, format: TranscriptFormat) -> String {
    match format {
        TranscriptFormat::Json => format_json(transcript),
        TranscriptFormat::Srt => format_srt(transcript),
        TranscriptFormat::Vtt => format_vtt(transcript),
    }
}

fn format_json(transcript: &Transcript) -> String {
    serde_json::to_string_pretty(transcript).unwrap_or_else(|_| "{}".to_string())
}

/// Format as SRT (SubRip).
fn format_srt(transcript: &Transcript) -> String {
    let mut output = String::new();

    for (i, segment) in transcript.segments.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(segment.start_sec),
            format_srt_timestamp(segment.end_sec)
        ));
        output.push_str(&segment.text);
        output.push_str("\n\n");
    }

    output
}

/// Format as WebVTT.
fn format_vtt(transcript: &Transcript) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for (i, segment) in transcript.segments.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_vtt_timestamp(segment.start_sec),
            format_vtt_timestamp(segment.end_sec)
        ));
        output.push_str(&segment.text);
        output.push_str("\n\n");
    }

    output
}

/// Format timestamp for SRT (00:00:00,000).
fn format_srt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, ms)
}

/// Format timestamp for VTT (00:00:00.000).
fn format_vtt_timestamp(seconds: f64) -> String {
    let total_ms = (seconds * 1000.0) as u64;
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let secs = (total_ms % 60_000) / 1000;
    let ms = total_ms % 1000;

    format!("{:02}:{:02}:{:02}.{:03}", hours, minutes, secs, ms)
}
