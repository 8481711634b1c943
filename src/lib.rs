//! Videre - Screen Recordings to Structured Documentation
//!
//! Videre turns screen recordings (meetings, demos, tutorials) into
//! structured documentation through a staged, asynchronous pipeline.
//! The name plays on the Latin *vidēre*, "to see", and the Norwegian
//! *videre*, "onward".
//!
//! # Overview
//!
//! A session moves through six stages:
//!
//! 1. Probe the input for duration and streams
//! 2. Build a cheap 1-fps analysis proxy plus a speech WAV
//! 3. Transcribe the audio (fast local / accurate remote, with fallback)
//! 4. Ask an LLM which moments are worth visualizing
//! 5. Extract full-resolution keyframes at those moments
//! 6. Generate a mode-specific document from frames + transcript
//!
//! Every artifact lands under a per-session directory, progress streams
//! through the session manager, and a JSONL trace records each stage.
//!
//! # Architecture
//!
//! - `config` - Configuration management
//! - `prompts` - Mode registry and safe template interpolation
//! - `media` - ffmpeg/ffprobe capability adapters
//! - `transcription` - Speech-to-text adapters and selection
//! - `analysis` - Relevant-moment selection
//! - `generate` - Document generation
//! - `store` - Session-scoped artifact storage
//! - `trace` - Per-session JSONL trace recording
//! - `session` - Session model and lifecycle
//! - `pipeline` - The orchestrator
//!
//! # Example
//!
//! ```rust,no_run
//! use videre::config::Settings;
//! use videre::pipeline::{Orchestrator, RunOptions};
//! use videre::session::{SessionMetadata, SessionSource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::from_settings(settings.clone())?;
//!
//!     let session = orchestrator
//!         .manager()
//!         .create(
//!             None,
//!             SessionMetadata {
//!                 mode: "general_doc".to_string(),
//!                 title: "Sprint demo".to_string(),
//!                 language: Some("en".to_string()),
//!                 stt_preference: Default::default(),
//!                 source: SessionSource::Local {
//!                     path: "demo.mp4".into(),
//!                 },
//!             },
//!         )
//!         .await?;
//!
//!     let options = RunOptions::from_settings(&settings, "general_doc");
//!     let outcome = orchestrator.run(&session.id, options).await?;
//!     println!("{}", outcome.doc.content);
//!
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod generate;
pub mod llm;
pub mod media;
pub mod pipeline;
pub mod prompts;
pub mod session;
pub mod store;
pub mod trace;
pub mod transcription;

pub use error::{ErrorKind, Result, VidereError};
