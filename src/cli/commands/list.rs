//! The `list` command.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::{Result, VidereError};
use crate::pipeline::Orchestrator;
use crate::session::SessionStatus;

pub async fn run_list(status: Option<String>, settings: Settings) -> Result<()> {
    let filter = match status.as_deref() {
        None => None,
        Some("draft") => Some(SessionStatus::Draft),
        Some("queued") => Some(SessionStatus::Queued),
        Some("running") => Some(SessionStatus::Running),
        Some("completed") => Some(SessionStatus::Completed),
        Some("failed") => Some(SessionStatus::Failed),
        Some("cancelled") => Some(SessionStatus::Cancelled),
        Some(other) => {
            return Err(VidereError::InputInvalid(format!(
                "unknown status filter: {}",
                other
            )));
        }
    };

    let orchestrator = Orchestrator::from_settings(settings)?;
    let summaries = orchestrator.manager().list(filter).await?;

    if summaries.is_empty() {
        Output::info("No sessions found");
        return Ok(());
    }

    Output::header(&format!("Sessions ({})", summaries.len()));
    for summary in summaries {
        Output::session_row(
            &summary.id,
            &summary.title,
            &summary.status.to_string(),
            summary.progress,
            &summary.mode,
        );
    }
    Ok(())
}
