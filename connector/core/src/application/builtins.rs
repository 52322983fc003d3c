// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Built-in console commands, registered once at connector start.

use std::sync::{Arc, Weak};

use crate::application::activation::ActivationTracker;
use crate::domain::command::InvocationError;
use crate::domain::discovery::{CommandProvider, Operation};
use crate::infrastructure::registry::CommandRegistry;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Provider for `help`, `activations` and `version`.
///
/// Holds weak references: the registry owns these commands, so a strong
/// reference back to it would never be freed.
pub struct BuiltinCommands {
    registry: Weak<CommandRegistry>,
    tracker: Weak<ActivationTracker>,
}

impl BuiltinCommands {
    pub fn new(registry: &Arc<CommandRegistry>, tracker: &Arc<ActivationTracker>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            tracker: Arc::downgrade(tracker),
        }
    }
}

impl CommandProvider for BuiltinCommands {
    fn operations(&self) -> Vec<Operation> {
        let registry = self.registry.clone();
        let tracker = self.tracker.clone();

        vec![
            Operation::new("help", "List available commands", move |_: &[String]| {
                let registry = registry
                    .upgrade()
                    .ok_or_else(|| InvocationError::failed("connector is shutting down"))?;
                Ok(render_help(&registry))
            }),
            Operation::new(
                "activations",
                "List live activations and their commands",
                move |_: &[String]| {
                    let tracker = tracker
                        .upgrade()
                        .ok_or_else(|| InvocationError::failed("connector is shutting down"))?;
                    Ok(render_activations(&tracker))
                },
            ),
            Operation::new("version", "Show the connector version", |args: &[String]| {
                if !args.is_empty() {
                    return Err(InvocationError::invalid_arguments("version takes no arguments"));
                }
                Ok(format!("crest {}", VERSION))
            }),
        ]
    }
}

fn render_help(registry: &CommandRegistry) -> String {
    let commands = registry.snapshot();
    let width = commands.iter().map(|c| c.name().len()).max().unwrap_or(0);

    commands
        .iter()
        .map(|c| format!("{:<width$}  {}", c.name(), c.description(), width = width))
        .map(|line| line.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_activations(tracker: &ActivationTracker) -> String {
    let summaries = tracker.summaries();
    if summaries.is_empty() {
        return "No live activations".to_string();
    }

    summaries
        .iter()
        .map(|s| format!("{}  {}  {}", s.handle, s.state, s.commands.join(", ")))
        .map(|line| line.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
