//! Session inspection commands: status, result, cancel, delete.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::{Result, VidereError};
use crate::pipeline::Orchestrator;

pub async fn run_status(id: Option<String>, active: bool, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    let manager = orchestrator.manager();

    let session = match (id, active) {
        (_, true) => match manager.get_active().await? {
            Some(session) => session,
            None => {
                Output::info("No active session");
                return Ok(());
            }
        },
        (Some(id), false) => manager.get(&id).await?,
        (None, false) => {
            return Err(VidereError::InputInvalid(
                "pass a session id or --active".into(),
            ));
        }
    };

    Output::header(&session.title);
    Output::kv("Session", &session.id);
    Output::kv("Mode", &session.mode);
    Output::kv("Status", &session.status.to_string());
    Output::kv("Progress", &format!("{}% ({})", session.progress, session.stage_label));
    Output::kv("Created", &session.created_at.to_rfc3339());
    Output::kv("Updated", &session.last_updated.to_rfc3339());
    if let Some(error) = &session.error {
        Output::kv("Error", &format!("{}: {}", error.kind, error.message));
    }
    Ok(())
}

pub async fn run_result(id: &str, output: Option<String>, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    let session = orchestrator.manager().get(id).await?;

    let doc = session.doc_payload.as_ref().ok_or_else(|| {
        VidereError::Session(format!(
            "session {} has no document (status: {})",
            id, session.status
        ))
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &doc.content)?;
            Output::success(&format!("Document written to {}", path));
        }
        None => println!("{}", doc.content),
    }

    if !session.artifact_paths.is_empty() {
        Output::header("Artifacts");
        for (name, path) in &session.artifact_paths {
            Output::kv(name, path);
        }
    }
    if let Some(adapter) = &session.stt_adapter_used {
        Output::kv("Transcriber", adapter);
    }
    Ok(())
}

pub async fn run_cancel(id: &str, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    if orchestrator.manager().cancel(id).await? {
        Output::success(&format!("Cancellation requested for {}", id));
    } else {
        Output::warning(&format!("Session {} is not cancellable", id));
    }
    Ok(())
}

pub async fn run_delete(id: &str, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::from_settings(settings)?;
    let session = orchestrator.manager().get(id).await?;
    if !session.status.is_terminal() {
        return Err(VidereError::Session(format!(
            "refusing to delete session in state {}; cancel it first",
            session.status
        )));
    }
    orchestrator.store().delete(id)?;
    Output::success(&format!("Deleted session {}", id));
    Ok(())
}
