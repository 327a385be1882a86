//! Implementations of the CLI subcommands.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use crate::agent::{Checkpointer, InMemorySaver, RunConfig, SqliteSaver};
use crate::config::{CheckpointBackend, Settings};
use crate::weather::{basic_agent, forecaster_agent, UserContext, WeatherReport};
use crate::{init_chat_model, ChatModel};

/// Create the chat model described by the settings
pub fn build_model(settings: &Settings) -> Result<ChatModel> {
    init_chat_model(&settings.model.name, &settings.model_settings())
        .with_context(|| format!("failed to initialise model '{}'", settings.model.name))
}

/// Open the configured checkpoint store
pub async fn build_checkpointer(settings: &Settings) -> Result<Arc<dyn Checkpointer>> {
    match settings.checkpoint.backend {
        CheckpointBackend::Memory => Ok(Arc::new(InMemorySaver::new())),
        CheckpointBackend::Sqlite => {
            let saver = SqliteSaver::connect(&settings.checkpoint.sqlite_url)
                .await
                .with_context(|| {
                    format!("failed to open checkpoint database {}", settings.checkpoint.sqlite_url)
                })?;
            Ok(Arc::new(saver))
        }
    }
}

fn print_report(report: &WeatherReport) {
    println!("Agent response:");
    println!("{}", report);
}

/// Two questions against the tool-only agent: one needs the tool, one does not.
pub async fn run_basic(settings: &Settings) -> Result<()> {
    let agent = basic_agent(build_model(settings)?)?;
    let run = RunConfig::new().max_iterations(settings.agent.max_iterations);

    let questions = [
        ("TEST 1: Asking about weather", "What is the weather in Tokyo?"),
        ("TEST 2: Asking a general question", "What is Python programming language?"),
    ];

    for (title, question) in questions {
        println!("\n {}", title);
        println!("User: {}\n", question);

        let state = agent.invoke(question, &run, &()).await?;
        debug!(messages = state.messages.len(), "basic run complete");
        println!("Agent: {}", state.last_text().unwrap_or_default());
    }

    println!("\nThe basic agent is working\n");
    Ok(())
}

/// Two messages on one thread against the forecaster.
pub async fn run_full(thread_id: &str, user_id: &str, settings: &Settings) -> Result<()> {
    let checkpointer = build_checkpointer(settings).await?;
    let agent = forecaster_agent(
        build_model(settings)?,
        checkpointer,
        Some(settings.agent.max_iterations),
    )?;
    let run = RunConfig::for_thread(thread_id);
    let context = UserContext::new(user_id);

    let messages = [
        ("MESSAGE 1: Asking about weather outside", "What is the weather outside?"),
        ("MESSAGE 2: Continuing the conversation", "Thank you!"),
    ];

    for (title, message) in messages {
        println!("\n {}", title);
        println!("User: {}\n", message);

        let report = agent.invoke(message, &run, &context).await?;
        print_report(&report);
    }

    println!("\nThe full agent is working with memory and structured output.\n");
    Ok(())
}

/// Answer one question, either as plain text or as a forecaster report.
pub async fn run_ask(
    question: &str,
    structured: bool,
    thread_id: Option<String>,
    user_id: Option<String>,
    settings: &Settings,
) -> Result<()> {
    if !structured {
        let agent = basic_agent(build_model(settings)?)?;
        let run = RunConfig::new().max_iterations(settings.agent.max_iterations);
        let state = agent.invoke(question, &run, &()).await?;
        println!("{}", state.last_text().unwrap_or_default());
        return Ok(());
    }

    let checkpointer = build_checkpointer(settings).await?;
    let agent = forecaster_agent(
        build_model(settings)?,
        checkpointer,
        Some(settings.agent.max_iterations),
    )?;
    let thread_id = thread_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let context = UserContext::new(user_id.unwrap_or_else(|| "1".to_string()));

    let report = agent
        .invoke(question, &RunConfig::for_thread(thread_id), &context)
        .await?;
    println!("{}", report);
    Ok(())
}

/// Interactive loop on one thread until EOF, `exit` or `quit`.
pub async fn run_chat(thread_id: &str, user_id: &str, settings: &Settings) -> Result<()> {
    let checkpointer = build_checkpointer(settings).await?;
    let agent = forecaster_agent(
        build_model(settings)?,
        checkpointer,
        Some(settings.agent.max_iterations),
    )?;
    let run = RunConfig::for_thread(thread_id);
    let context = UserContext::new(user_id);

    println!("\nWeather chat (thread {}). Type 'exit' to quit.\n", thread_id);

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        match agent.invoke(input, &run, &context).await {
            Ok(report) => {
                println!("Agent: {}", report.punny_response);
                if let Some(conditions) = &report.weather_conditions {
                    println!("       ({})", conditions);
                }
                println!();
            }
            Err(e) => eprintln!("Error: {}\n", e),
        }
    }

    info!(thread = thread_id, "chat session ended");
    Ok(())
}
