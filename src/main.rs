//! Weather agent CLI entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use weather_agent::cli::{commands, Cli, Commands};
use weather_agent::config::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

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
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("weather_agent={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Load configuration
    let settings = Settings::load_from(cli.config.as_deref())?;

    match cli.command {
        Commands::Basic => {
            commands::run_basic(&settings).await?;
        }

        Commands::Full { thread_id, user_id } => {
            commands::run_full(&thread_id, &user_id, &settings).await?;
        }

        Commands::Ask {
            question,
            structured,
            thread_id,
            user_id,
        } => {
            commands::run_ask(&question, structured, thread_id, user_id, &settings).await?;
        }

        Commands::Chat { thread_id, user_id } => {
            commands::run_chat(&thread_id, &user_id, &settings).await?;
        }
    }

    Ok(())
}
