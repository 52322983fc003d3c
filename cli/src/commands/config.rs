// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use crest_core::domain::connector_config::ConnectorConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with default values
    Generate {
        /// Output path (default: ./crest-config.yaml)
        #[arg(short, long, default_value = "./crest-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(&output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ConnectorConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. CREST_CONFIG_PATH: {}",
            std::env::var("CREST_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./crest-config.yaml");
        println!("  4. ~/.crest/config.yaml");
        println!("  5. /etc/crest/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Connector:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Prompt: {}", config.spec.prompt);
    println!();

    let listeners = &config.spec.listeners;
    println!("{}", "Listeners:".bold());
    println!("  Bind address: {}", listeners.bind_address);
    println!("  SSH port: {}", port_label(listeners.ssh_port));
    println!("  Line port: {}", port_label(listeners.line_port));
    println!();

    let workers = &config.spec.workers;
    println!("{}", "Workers:".bold());
    println!("  Threads: {}", workers.threads);
    println!("  Max pending: {}", workers.max_pending);
    match workers.execute_timeout_ms {
        Some(ms) => println!("  Execute timeout: {}ms", ms),
        None => println!("  Execute timeout: {}", "(none)".dimmed()),
    }
    println!();

    let security = &config.spec.security;
    println!("{}", "Security:".bold());
    println!("  Anonymous: {}", security.anonymous);
    println!("  Users: {}", security.users.len());
    for user in &security.users {
        println!("    - {}", user.name);
    }
    println!();

    Ok(())
}

fn port_label(port: Option<u16>) -> String {
    match port {
        Some(port) => port.to_string(),
        None => "disabled".dimmed().to_string(),
    }
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ConnectorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            output.display()
        );
    }

    ConnectorConfig::default()
        .to_yaml_file(output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("crest-config.yaml");

        generate(&path, false).await.unwrap();
        validate(Some(path.clone())).await.unwrap();

        // Refuses to clobber without --force
        assert!(generate(&path, false).await.is_err());
        generate(&path, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_validate_rejects_bad_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            "apiVersion: crest/v1\nkind: NodeConfig\nmetadata:\n  name: test\nspec: {}\n",
        )
        .unwrap();

        assert!(validate(Some(path)).await.is_err());
    }
}
