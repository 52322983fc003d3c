// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command Registry
//!
//! The one resource mutated by more than one component: built-ins are put at
//! start, activations put and remove batches, and every console session
//! resolves through it.
//!
//! # Concurrency
//!
//! A single `RwLock` guards the map. Every mutation, batches included,
//! happens under one write-lock acquisition, so a `resolve` observes either
//! all or none of it. Readers clone the `Arc<Command>` and drop the lock
//! before invoking anything.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::domain::command::Command;
use crate::domain::session::CommandResolver;

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, Arc<Command>>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name. Last writer wins.
    pub fn put(&self, command: Arc<Command>) {
        let name = command.name().to_string();
        let (previous, len) = {
            let mut map = self.commands.write();
            let previous = map.insert(name.clone(), command);
            (previous, map.len())
        };
        if previous.is_some() {
            debug!(command = %name, "Replaced existing command");
        }
        metrics::gauge!("crest_commands_registered").set(len as f64);
    }

    /// Insert a batch atomically with respect to readers.
    pub fn put_all(&self, commands: &[Arc<Command>]) {
        let len = {
            let mut map = self.commands.write();
            for command in commands {
                if map.insert(command.name().to_string(), Arc::clone(command)).is_some() {
                    debug!(command = %command.name(), "Replaced existing command");
                }
            }
            map.len()
        };
        metrics::gauge!("crest_commands_registered").set(len as f64);
    }

    /// Remove by name. Absent names are a no-op.
    pub fn remove(&self, name: &str) -> Option<Arc<Command>> {
        let (removed, len) = {
            let mut map = self.commands.write();
            let removed = map.remove(name);
            (removed, map.len())
        };
        metrics::gauge!("crest_commands_registered").set(len as f64);
        removed
    }

    /// Remove `command` only if it is still the entry registered under its name.
    ///
    /// Returns false when the name is absent or now belongs to another command.
    pub fn remove_command(&self, command: &Arc<Command>) -> bool {
        self.remove_commands(std::slice::from_ref(command)) == 1
    }

    /// Identity-aware batch removal under a single write lock.
    ///
    /// Returns how many of `commands` were still registered and got removed.
    pub fn remove_commands(&self, commands: &[Arc<Command>]) -> usize {
        let (removed, len) = {
            let mut map = self.commands.write();
            let mut removed = 0;
            for command in commands {
                if map
                    .get(command.name())
                    .is_some_and(|current| Arc::ptr_eq(current, command))
                {
                    map.remove(command.name());
                    removed += 1;
                }
            }
            (removed, map.len())
        };
        metrics::gauge!("crest_commands_registered").set(len as f64);
        removed
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<Command>> {
        self.commands.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands.read().contains_key(name)
    }

    /// All live commands, sorted by name
    pub fn snapshot(&self) -> Vec<Arc<Command>> {
        let mut commands: Vec<Arc<Command>> = self.commands.read().values().cloned().collect();
        commands.sort_by(|a, b| a.name().cmp(b.name()));
        commands
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CommandResolver for CommandRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<Command>> {
        CommandRegistry::resolve(self, name)
    }

    fn snapshot(&self) -> Vec<Arc<Command>> {
        CommandRegistry::snapshot(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::command::{CommandKind, InvocationError};
    use std::thread;

    fn command(name: &str, output: &'static str) -> Arc<Command> {
        Arc::new(Command::new(
            name,
            "",
            CommandKind::BuiltIn,
            Arc::new(move |_: &[String]| -> Result<String, InvocationError> { Ok(output.to_string()) }),
        ))
    }

    #[test]
    fn test_put_resolve_remove() {
        let registry = CommandRegistry::new();
        registry.put(command("status", "up"));

        let resolved = registry.resolve("status").unwrap();
        assert_eq!(resolved.invoke(&[]).unwrap(), "up");

        assert!(registry.remove("status").is_some());
        assert!(registry.resolve("status").is_none());
        assert!(registry.remove("status").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = CommandRegistry::new();
        registry.put(command("status", "first"));
        registry.put(command("status", "second"));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("status").unwrap().invoke(&[]).unwrap(), "second");
    }

    #[test]
    fn test_remove_command_is_identity_aware() {
        let registry = CommandRegistry::new();
        let original = command("status", "first");
        let replacement = command("status", "second");

        registry.put(Arc::clone(&original));
        registry.put(Arc::clone(&replacement));

        assert!(!registry.remove_command(&original));
        assert!(registry.contains("status"));
        assert!(registry.remove_command(&replacement));
        assert!(!registry.contains("status"));
    }

    #[test]
    fn test_snapshot_is_sorted() {
        let registry = CommandRegistry::new();
        registry.put_all(&[command("zeta", ""), command("alpha", ""), command("mid", "")]);

        let names: Vec<String> = registry.snapshot().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_resolved_command_survives_removal() {
        let registry = CommandRegistry::new();
        registry.put(command("status", "up"));

        let resolved = registry.resolve("status").unwrap();
        registry.remove("status");
        assert_eq!(resolved.invoke(&[]).unwrap(), "up");
    }

    /// Records every value written to any gauge
    #[derive(Default)]
    struct GaugeLog(parking_lot::Mutex<Vec<f64>>);

    impl metrics::GaugeFn for GaugeLog {
        fn increment(&self, _value: f64) {}

        fn decrement(&self, _value: f64) {}

        fn set(&self, value: f64) {
            self.0.lock().push(value);
        }
    }

    struct GaugeRecorder(Arc<GaugeLog>);

    impl metrics::Recorder for GaugeRecorder {
        fn describe_counter(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_gauge(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}
        fn describe_histogram(&self, _: metrics::KeyName, _: Option<metrics::Unit>, _: metrics::SharedString) {}

        fn register_counter(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Counter {
            metrics::Counter::noop()
        }

        fn register_gauge(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Gauge {
            metrics::Gauge::from_arc(Arc::clone(&self.0))
        }

        fn register_histogram(&self, _: &metrics::Key, _: &metrics::Metadata<'_>) -> metrics::Histogram {
            metrics::Histogram::noop()
        }
    }

    #[test]
    fn test_gauge_reports_size_seen_by_each_write() {
        let log = Arc::new(GaugeLog::default());
        let recorder = GaugeRecorder(Arc::clone(&log));
        let registry = CommandRegistry::new();

        metrics::with_local_recorder(&recorder, || {
            registry.put(command("status", "up"));
            registry.put(command("health", "ok"));
            registry.put(command("status", "again"));
            registry.remove("health");
            registry.remove("missing");
        });

        assert_eq!(*log.0.lock(), vec![1.0, 2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn test_batches_are_never_partially_visible() {
        let registry = Arc::new(CommandRegistry::new());
        let batch: Vec<Arc<Command>> = (0..16).map(|i| command(&format!("cmd{}", i), "")).collect();

        let writer = {
            let registry = Arc::clone(&registry);
            let batch = batch.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    registry.put_all(&batch);
                    assert_eq!(registry.remove_commands(&batch), 16);
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for _ in 0..2_000 {
                        let len = registry.snapshot().len();
                        assert!(len == 0 || len == 16, "observed torn batch of {}", len);
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
