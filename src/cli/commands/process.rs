//! The `process` command: submit a session and drive it to completion.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::{Result, VidereError};
use crate::pipeline::{Orchestrator, RunOptions};
use crate::session::{SessionMetadata, SessionSource};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[allow(clippy::too_many_arguments)]
pub async fn run_process(
    input: &str,
    mode: &str,
    title: Option<String>,
    language: Option<String>,
    stt: Option<String>,
    segmented: bool,
    keywords: Option<String>,
    attendees: Option<String>,
    max_keyframes: Option<usize>,
    settings: Settings,
) -> Result<()> {
    let source_path = PathBuf::from(shellexpand::tilde(input).to_string());
    if !source_path.exists() {
        return Err(VidereError::InputInvalid(format!(
            "input file not found: {}",
            source_path.display()
        )));
    }

    let stt_preference = match stt {
        Some(s) => s.parse().map_err(VidereError::Config)?,
        None => settings.stt.preference_default,
    };

    let title = title.unwrap_or_else(|| {
        source_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string()
    });

    let mut options = RunOptions::from_settings(&settings, mode);
    options.language = language;
    options.stt_preference = stt_preference;
    options.segment_pipeline = segmented;
    options.context_keywords = split_csv(keywords);
    options.attendees = split_csv(attendees);
    if let Some(max) = max_keyframes {
        options.max_keyframes = max;
    }

    let sweep_interval = Duration::from_secs(settings.sessions.sweep_interval_sec);
    let orchestrator = Arc::new(Orchestrator::from_settings(settings)?);
    let manager = orchestrator.manager();
    let sweeper = manager.spawn_sweeper(sweep_interval);

    let session = manager
        .create(
            None,
            SessionMetadata {
                mode: mode.to_string(),
                title: title.clone(),
                language: options.language.clone(),
                stt_preference,
                source: SessionSource::Local {
                    path: source_path,
                },
            },
        )
        .await?;
    manager.enqueue(&session.id).await?;

    Output::info(&format!("Session {} ({})", session.id, title));

    // Ctrl+C requests cancellation instead of killing the process.
    {
        let manager = manager.clone();
        let session_id = session.id.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling session {}", session_id);
                let _ = manager.cancel(&session_id).await;
            }
        });
    }

    let run_handle = {
        let orchestrator = orchestrator.clone();
        let session_id = session.id.clone();
        let options = options.clone();
        tokio::spawn(async move { orchestrator.run(&session_id, options).await })
    };

    // Mirror the session's progress until it goes terminal.
    let pb = Output::pipeline_bar();
    loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let Ok(current) = manager.get(&session.id).await else {
            break;
        };
        pb.set_position(current.progress as u64);
        pb.set_message(current.stage_label.clone());
        if current.status.is_terminal() {
            break;
        }
    }
    pb.finish_and_clear();

    let result = run_handle
        .await
        .map_err(|e| VidereError::Internal(format!("run task panicked: {}", e)))?;

    manager.shutdown();
    sweeper.abort();

    match result {
        Ok(outcome) => {
            Output::success(&format!(
                "Completed with {} keyframes ({} transcriber)",
                outcome.keyframes.len(),
                outcome.stt_adapter_used.as_deref().unwrap_or("no"),
            ));
            println!();
            Output::kv("Session", &outcome.session.id);
            Output::kv("Document", outcome.doc.artifact_name());
            for (name, path) in &outcome.manifest {
                Output::kv(name, path);
            }
            println!("\n{}", outcome.doc.content);
            Ok(())
        }
        Err(VidereError::Cancelled) => {
            Output::warning("Session cancelled");
            Err(VidereError::Cancelled)
        }
        Err(e) => {
            Output::error(&format!("Pipeline failed: {}", e));
            Err(e)
        }
    }
}

fn split_csv(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
