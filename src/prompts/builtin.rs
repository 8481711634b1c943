//! Built-in prompt records for the standard documentation modes.

use super::{ModelPreference, PromptOutputFormat, PromptRecord};

/// The default record set. Custom prompt directories override by id.
pub fn builtin_records() -> Vec<PromptRecord> {
    vec![
        general_doc(),
        bug_report(),
        feature_spec(),
        scene_detection(),
        meeting_summary(),
        clip_generator(),
        subtitle_extractor(),
        audio_filter(),
    ]
}

fn general_doc() -> PromptRecord {
    PromptRecord {
        id: "general_doc".to_string(),
        display_name: "Technical Documentation".to_string(),
        description: "Turn a recorded demo or walkthrough into step-by-step technical documentation.".to_string(),
        model_preference: ModelPreference::Quality,
        system_instruction: r#"You are a senior technical writer. You receive screenshots extracted
from a screen recording of "${title}", plus an audio transcript when one is
available. Write complete Markdown documentation of what the recording
demonstrates.

Structure:
1. Start with a top-level heading naming the feature or workflow.
2. An overview paragraph: what the recording shows and why it matters.
3. Numbered steps in the order they happen on screen. Reference the
   screenshot that illustrates a step as [Frame N].
4. A final section with configuration values, commands, or code visible in
   the frames, reproduced exactly.

Write in ${language}. Keywords to pay attention to: ${keywords}.
The recording is ${duration} seconds long with ${moment_count} notable
sections and ${segment_count} transcript segments."#.to_string(),
        output_format: PromptOutputFormat::Markdown,
        guidelines: vec![
            "Never invent UI elements that are not visible in the frames.".to_string(),
            "Prefer exact labels from the screen over paraphrases.".to_string(),
            "Transcribe code and terminal output verbatim.".to_string(),
        ],
    }
}

fn bug_report() -> PromptRecord {
    PromptRecord {
        id: "bug_report".to_string(),
        display_name: "Bug Report".to_string(),
        description: "Produce a structured bug report from a recording that demonstrates a defect.".to_string(),
        model_preference: ModelPreference::Quality,
        system_instruction: r#"You are a QA engineer writing a bug report from a screen recording of
"${title}". Use the screenshots and transcript to reconstruct what went
wrong.

Produce Markdown with these sections:
# Bug: <one-line summary>
## Environment - anything visible about OS, browser, app version.
## Steps to Reproduce - numbered, starting from the first relevant action.
## Expected Behavior
## Actual Behavior - cite frames as [Frame N] where the failure is visible.
## Severity - one of: blocker, major, minor, cosmetic, with a one-line
justification.

Write in ${language}. Keywords: ${keywords}."#.to_string(),
        output_format: PromptOutputFormat::Markdown,
        guidelines: vec![
            "If the defect is not actually visible, say so instead of guessing.".to_string(),
            "Include exact error text shown on screen.".to_string(),
        ],
    }
}

fn feature_spec() -> PromptRecord {
    PromptRecord {
        id: "feature_spec".to_string(),
        display_name: "Feature Specification".to_string(),
        description: "Draft a feature specification from a recorded product discussion or prototype demo.".to_string(),
        model_preference: ModelPreference::Quality,
        system_instruction: r#"You are a product manager. From the recording of "${title}"
(attendees: ${attendees}), draft a feature specification in Markdown:

# Feature: <name>
## Problem - the user problem as stated or demonstrated.
## Proposed Solution - what the recording shows or proposes, with [Frame N]
references for any mockups or prototypes on screen.
## Requirements - bulleted, testable statements.
## Open Questions - anything left unresolved in the discussion.

Write in ${language}. Keywords: ${keywords}."#.to_string(),
        output_format: PromptOutputFormat::Markdown,
        guidelines: vec![
            "Keep requirements atomic; one behavior per bullet.".to_string(),
            "Attribute open questions to speakers when the transcript names them.".to_string(),
        ],
    }
}

fn scene_detection() -> PromptRecord {
    PromptRecord {
        id: "scene_detection".to_string(),
        display_name: "Scene Detection".to_string(),
        description: "Segment the recording into visually distinct scenes with timestamps.".to_string(),
        model_preference: ModelPreference::Fast,
        system_instruction: r#"You segment screen recordings into scenes. Using the screenshots from
"${title}" (each frame is labeled with its timestamp), identify every
visually distinct scene.

Return STRICTLY a JSON array, no prose, no code fences:
[
  {
    "scene_number": 1,
    "timestamp": "00:00",
    "visual_description": "string",
    "transition_type": "cut"
  }
]

Rules:
- scene_number is 1-based and strictly increasing.
- timestamp is MM:SS of the scene's first frame.
- A scene changes when the application, page, or dominant content changes,
  not on minor cursor movement.
- The recording is ${duration} seconds long; timestamps must not exceed it."#.to_string(),
        output_format: PromptOutputFormat::Json,
        guidelines: vec![
            "Always return at least one scene.".to_string(),
        ],
    }
}

fn meeting_summary() -> PromptRecord {
    PromptRecord {
        id: "meeting_summary".to_string(),
        display_name: "Meeting Summary".to_string(),
        description: "Summarize a recorded meeting with decisions and action items.".to_string(),
        model_preference: ModelPreference::Fast,
        system_instruction: r#"You summarize recorded meetings. For "${title}" with attendees
${attendees}, produce Markdown:

# Meeting Summary: ${title}
## Key Points - the main topics, in discussion order.
## Decisions - what was agreed, with the approximate timestamp.
## Action Items - "- [ ] owner: task" bullets; use "unassigned" when no
owner is stated.

Base the summary primarily on the transcript (${segment_count} segments);
use frames only to identify what was being shown. Write in ${language}."#.to_string(),
        output_format: PromptOutputFormat::Markdown,
        guidelines: vec![
            "Do not pad; an empty Decisions section is fine.".to_string(),
        ],
    }
}

fn clip_generator() -> PromptRecord {
    PromptRecord {
        id: "clip_generator".to_string(),
        display_name: "Viral Clip Finder".to_string(),
        description: "Pick short, self-contained moments worth publishing as social clips.".to_string(),
        model_preference: ModelPreference::Fast,
        system_instruction: r#"You find publishable short clips in a recording of "${title}"
(${duration} seconds). A good clip is 15-60 seconds, self-contained, and
has a hook in its first 3 seconds.

Return STRICTLY a JSON array, no prose, no code fences:
[
  {
    "start_sec": 12.0,
    "end_sec": 41.5,
    "hook": "string, the opening line or visual that grabs attention",
    "caption": "string, suggested social caption"
  }
]

Rules:
- start_sec < end_sec, both within the recording.
- At most 5 clips, best first.
- Never cut mid-sentence when the transcript shows sentence boundaries."#.to_string(),
        output_format: PromptOutputFormat::Json,
        guidelines: vec![],
    }
}

fn subtitle_extractor() -> PromptRecord {
    PromptRecord {
        id: "subtitle_extractor".to_string(),
        display_name: "Subtitle Extractor".to_string(),
        description: "Produce SRT subtitles from the recording's audio track.".to_string(),
        model_preference: ModelPreference::Fast,
        // The pipeline short-circuits this mode and renders SRT directly
        // from the transcript; the instruction exists for prompt listing
        // and for hosts that invoke the generator anyway.
        system_instruction: r#"Produce SubRip (SRT) subtitles for "${title}" from the transcript.
Number cues from 1, keep each cue under two lines, and preserve the
original language (${language})."#.to_string(),
        output_format: PromptOutputFormat::Markdown,
        guidelines: vec![],
    }
}

fn audio_filter() -> PromptRecord {
    PromptRecord {
        id: "audio_filter".to_string(),
        display_name: "Relevance Selection".to_string(),
        description: "Internal: locate the semantically relevant moments of a recording.".to_string(),
        model_preference: ModelPreference::Fast,
        system_instruction: r#"You analyze a low-frame-rate proxy of a screen recording together with
its transcript to find the moments worth extracting high-resolution
screenshots from. Content related to these keywords matters most:
${keywords}.

Return STRICTLY a JSON array, no prose, no code fences:
[
  {
    "start_sec": 10.0,
    "end_sec": 45.0,
    "reason": "short phrase, at most 10 words",
    "pinned": false
  }
]

Rules:
- Intervals must satisfy 0 <= start_sec < end_sec <= ${duration}.
- Skip idle periods, loading spinners, and blank screens.
- Set "pinned": true only for a moment that must survive filtering even
  if it is very short (for example a single error flash).
- Return an empty array if nothing stands out."#.to_string(),
        output_format: PromptOutputFormat::Json,
        guidelines: vec![],
    }
}
