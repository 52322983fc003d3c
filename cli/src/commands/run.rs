// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `crest run` - serve consoles in the foreground until a shutdown signal

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::signal;
use tracing::{info, warn};

use crest_core::application::lifecycle::Connector;
use crest_core::domain::connector_config::ConnectorConfig;
use crest_core::domain::events::ConnectorEvent;

/// Serve with an already loaded configuration; it is validated here.
pub async fn execute(config: ConnectorConfig) -> Result<()> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let security = &config.spec.security;
    if !security.anonymous && security.users.is_empty() {
        warn!("No console users configured and anonymous access is off; every login will be denied");
    }

    let connector = Connector::from_config(&config).context("Failed to build connector")?;
    let mut events = connector.event_bus().subscribe();

    connector
        .start()
        .await
        .context("Failed to start connector")?;

    while let Ok(ConnectorEvent::ListenerStarted { transport, address, .. }) = events.try_recv() {
        println!(
            "{}",
            format!("✓ {} console listening on {}", transport, address).green()
        );
    }
    println!("Connector '{}' running. Press Ctrl+C to stop.", config.metadata.name);

    shutdown_signal().await;

    let report = connector
        .shutdown()
        .await
        .context("Failed to stop connector")?;
    for failure in &report.failures {
        eprintln!(
            "{}",
            format!("⚠ {} listener did not stop cleanly: {}", failure.transport, failure.error)
                .yellow()
        );
    }

    info!("Connector shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
