//! The `init` command: write a default configuration.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;

pub fn run_init(settings: &Settings) -> Result<()> {
    let config_path = Settings::default_config_path();

    if config_path.exists() {
        Output::info(&format!(
            "Configuration already exists at {}",
            config_path.display()
        ));
    } else {
        settings.save()?;
        Output::success(&format!("Wrote configuration to {}", config_path.display()));
    }

    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.sessions_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;
    Output::success(&format!(
        "Data directory ready at {}",
        settings.data_dir().display()
    ));

    Output::info("Run `videre doctor` to verify external tools.");
    Ok(())
}
