//! CLI module for Videre.

pub mod commands;
mod output;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Videre - Screen Recordings to Structured Documentation
///
/// Turn screen recordings of meetings, demos, and tutorials into
/// structured documentation with a local-first processing pipeline.
#[derive(Parser, Debug)]
#[command(name = "videre")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Videre and write a default configuration
    Init,

    /// Check external tools and configuration
    Doctor,

    /// Process a recording into documentation
    Process {
        /// Path to the input video file
        input: String,

        /// Documentation mode (see `videre modes`)
        #[arg(short, long, default_value = "general_doc")]
        mode: String,

        /// Project or meeting title
        #[arg(short, long)]
        title: Option<String>,

        /// Language hint for transcription (e.g. en, he)
        #[arg(short, long)]
        language: Option<String>,

        /// Transcriber preference: auto, fast, or accurate
        #[arg(long)]
        stt: Option<String>,

        /// Process the video in fixed-length chunks
        #[arg(long)]
        segmented: bool,

        /// Comma-separated keywords guiding relevance analysis
        #[arg(short, long)]
        keywords: Option<String>,

        /// Comma-separated attendee names for meeting modes
        #[arg(long)]
        attendees: Option<String>,

        /// Cap on extracted keyframes
        #[arg(long)]
        max_keyframes: Option<usize>,
    },

    /// Show a session's status
    Status {
        /// Session id (omit with --active)
        id: Option<String>,

        /// Show the most recently active session instead
        #[arg(long)]
        active: bool,
    },

    /// Print a completed session's document
    Result {
        /// Session id
        id: String,

        /// Write the document to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Cancel a queued or running session
    Cancel {
        /// Session id
        id: String,
    },

    /// List sessions
    List {
        /// Filter by status (draft, queued, running, completed, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
    },

    /// List available documentation modes
    Modes,

    /// Delete a session and its artifacts
    Delete {
        /// Session id
        id: String,
    },
}
