// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Crest Connector CLI
//!
//! The `crest` binary runs the command-endpoint connector in the foreground
//! and manages its configuration.
//!
//! ## Commands
//!
//! - `crest run` - Start the console listeners and serve until Ctrl+C/SIGTERM
//! - `crest config show|validate|generate` - Configuration management
//! - `crest hash-password` - Digest a password for the `security.users` section

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use crest_connector::commands::{self, ConfigCommand};
use crest_core::domain::connector_config::ConnectorConfig;

/// Crest Connector - console access to live command endpoints
#[derive(Parser)]
#[command(name = "crest")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CREST_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the config value
    #[arg(long, global = true, env = "CREST_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, json); defaults to the config value
    #[arg(long, global = true, env = "CREST_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the connector in the foreground
    #[command(name = "run")]
    Run,

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Print the SHA-256 digest of a console password
    #[command(name = "hash-password")]
    HashPassword {
        /// Password to hash (read from stdin when omitted)
        password: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Parsed once before logging exists; flags win over its logging defaults
    let loaded = ConnectorConfig::resolve(cli.config.clone());
    let observability = loaded
        .as_ref()
        .map(|(config, _)| config.spec.observability.clone())
        .unwrap_or_default();
    let level = cli.log_level.unwrap_or(observability.log_level);
    let format = cli.log_format.unwrap_or(observability.log_format);
    init_logging(&level, &format)?;

    match cli.command {
        Some(Commands::Run) => {
            let (config, source) = loaded.context("Failed to load configuration")?;
            commands::run::execute(config.finish(&source)).await
        }
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::HashPassword { password }) => commands::hash_password::execute(password),
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}
