//! The `modes` command.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;
use crate::prompts::{PromptRegistry, RELEVANCE_PROMPT_ID};

pub fn run_modes(settings: &Settings) -> Result<()> {
    let registry = PromptRegistry::load(
        settings.prompts.custom_dir.as_deref(),
        Some(&settings.prompts.variables),
    )?;

    Output::header("Documentation modes");
    for record in registry.list()? {
        if record.id == RELEVANCE_PROMPT_ID {
            continue;
        }
        Output::list_item(&format!("{} ({})", record.id, record.output_format));
        Output::kv(&record.display_name, &record.description);
    }
    Ok(())
}
