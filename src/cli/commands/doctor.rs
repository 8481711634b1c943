//! The `doctor` command: verify external tools and configuration.

use crate::cli::Output;
use crate::config::Settings;
use crate::error::Result;
use crate::llm::is_api_key_configured;
use std::process::Stdio;
use tokio::process::Command;

pub async fn run_doctor(settings: &Settings) -> Result<()> {
    Output::header("Videre doctor");

    let mut ok = true;
    ok &= check_tool("ffmpeg", &["-version"]).await;
    ok &= check_tool("ffprobe", &["-version"]).await;

    let local_stt = check_tool(&settings.stt.local_binary, &["--help"]).await;
    if !local_stt {
        Output::warning(&format!(
            "{} not found; local transcription will fall back to the remote API",
            settings.stt.local_binary
        ));
    }

    if is_api_key_configured() {
        Output::success("OPENAI_API_KEY is set");
    } else {
        Output::warning(
            "OPENAI_API_KEY is not set; remote transcription, relevance analysis, \
             and generation will be unavailable",
        );
        ok = false;
    }

    Output::kv("Data directory", &settings.data_dir().display().to_string());
    Output::kv("Config file", &Settings::default_config_path().display().to_string());

    if ok {
        println!();
        Output::success("All required checks passed");
    }
    Ok(())
}

async fn check_tool(binary: &str, args: &[&str]) -> bool {
    let result = Command::new(binary)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        Ok(_) => {
            Output::success(&format!("{} found", binary));
            true
        }
        Err(_) => {
            Output::error(&format!("{} not found in PATH", binary));
            false
        }
    }
}
