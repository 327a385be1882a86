//! Command-line interface for the weather agent demos.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Weather agent - tool calling, thread memory and structured output over a chat model
#[derive(Parser, Debug)]
#[command(name = "weather_agent")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the basic demo: one weather tool, no memory
    Basic,

    /// Run the full demo: user context, thread memory and a structured report
    Full {
        /// Conversation thread shared by both messages
        #[arg(long, default_value = "1")]
        thread_id: String,

        /// User id handed to the location tool
        #[arg(long, default_value = "1")]
        user_id: String,
    },

    /// Ask a single question
    Ask {
        /// The question to ask
        question: String,

        /// Use the forecaster and print a structured report
        #[arg(short, long)]
        structured: bool,

        /// Conversation thread (structured mode only)
        #[arg(long, requires = "structured")]
        thread_id: Option<String>,

        /// User id handed to the location tool (structured mode only)
        #[arg(long, requires = "structured")]
        user_id: Option<String>,
    },

    /// Start an interactive chat with the forecaster on one thread
    Chat {
        /// Conversation thread to use
        #[arg(long, default_value = "1")]
        thread_id: String,

        /// User id handed to the location tool
        #[arg(long, default_value = "1")]
        user_id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_defaults() {
        let cli = Cli::parse_from(["weather_agent", "-vv", "full"]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Full { thread_id, user_id } => {
                assert_eq!(thread_id, "1");
                assert_eq!(user_id, "1");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_ask_thread_requires_structured() {
        let result = Cli::try_parse_from(["weather_agent", "ask", "hi", "--thread-id", "7"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from(["weather_agent", "ask", "hi", "-s", "--thread-id", "7"]).unwrap();
        assert!(matches!(cli.command, Commands::Ask { structured: true, .. }));
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["weather_agent", "basic", "--config", "agent.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("agent.toml")));
    }
}
