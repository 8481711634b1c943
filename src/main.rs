//! Videre CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use videre::cli::{commands, Cli, Commands, Output};
use videre::config::Settings;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("videre={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(e) = run(cli).await {
        Output::error(&e.to_string());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> videre::Result<()> {
    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // Ensure data directories exist
    std::fs::create_dir_all(settings.data_dir())?;
    std::fs::create_dir_all(settings.temp_dir())?;

    match cli.command {
        Commands::Init => commands::run_init(&settings),

        Commands::Doctor => commands::run_doctor(&settings).await,

        Commands::Process {
            input,
            mode,
            title,
            language,
            stt,
            segmented,
            keywords,
            attendees,
            max_keyframes,
        } => {
            commands::run_process(
                &input,
                &mode,
                title,
                language,
                stt,
                segmented,
                keywords,
                attendees,
                max_keyframes,
                settings,
            )
            .await
        }

        Commands::Status { id, active } => commands::run_status(id, active, settings).await,

        Commands::Result { id, output } => commands::run_result(&id, output, settings).await,

        Commands::Cancel { id } => commands::run_cancel(&id, settings).await,

        Commands::List { status } => commands::run_list(status, settings).await,

        Commands::Modes => commands::run_modes(&settings),

        Commands::Delete { id } => commands::run_delete(&id, settings).await,
    }
}
