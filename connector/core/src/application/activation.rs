// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Activation Application Service
//!
//! Coordinates:
//! - Domain layer: command discovery, activation records
//! - Infrastructure layer: CommandRegistry, WorkDispatcher
//! - Event bus: ConnectorEvents for observability
//!
//! # Registration protocol
//!
//! `activate` creates the record synchronously and only *schedules* the
//! registry insert. The scheduled unit re-checks under the tracker lock that
//! the same record (same generation) is still live before inserting, so an
//! activation that is deactivated before its unit runs never leaks commands
//! into the registry. Lock order is always tracker, then registry.
//!
//! `deactivate` marks the record `Deactivating` first, so it stays visible
//! (and blocks a re-activation of the same handle) until its commands are
//! removed and the endpoint is released.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::activation::{
    ActivationError, ActivationHandle, ActivationRecord, ActivationState, EndpointDescriptor,
    EndpointResource,
};
use crate::domain::command::Command;
use crate::domain::discovery::{discover, DiscoveryContext};
use crate::domain::dispatcher::WorkDispatcher;
use crate::domain::events::ConnectorEvent;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::registry::CommandRegistry;

// ============================================================================
// Activation Tracker
// ============================================================================

/// Live activation records keyed by handle. One global lock; activation
/// traffic is rare compared to command resolution.
#[derive(Debug, Default)]
pub struct ActivationTracker {
    records: Mutex<HashMap<ActivationHandle, ActivationRecord>>,
}

/// Read-only view of one live activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationSummary {
    pub handle: ActivationHandle,
    pub state: ActivationState,
    pub commands: Vec<String>,
}

impl ActivationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, handle: &ActivationHandle) -> bool {
        self.records.lock().contains_key(handle)
    }

    pub fn state(&self, handle: &ActivationHandle) -> Option<ActivationState> {
        self.records.lock().get(handle).map(|record| record.state)
    }

    /// Live handles, sorted
    pub fn handles(&self) -> Vec<ActivationHandle> {
        let mut handles: Vec<ActivationHandle> = self.records.lock().keys().cloned().collect();
        handles.sort();
        handles
    }

    pub fn summaries(&self) -> Vec<ActivationSummary> {
        let mut summaries: Vec<ActivationSummary> = self
            .records
            .lock()
            .values()
            .map(|record| ActivationSummary {
                handle: record.handle.clone(),
                state: record.state,
                commands: record.command_names(),
            })
            .collect();
        summaries.sort_by(|a, b| a.handle.cmp(&b.handle));
        summaries
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, record: ActivationRecord) -> Result<(), ActivationError> {
        let mut records = self.records.lock();
        if records.contains_key(&record.handle) {
            return Err(ActivationError::Duplicate(record.handle));
        }
        records.insert(record.handle.clone(), record);
        Ok(())
    }

    /// `Activating -> Active`; a record already being deactivated stays so
    fn mark_active(&self, handle: &ActivationHandle, generation: Uuid) {
        if let Some(record) = self.records.lock().get_mut(handle) {
            if record.generation == generation && record.state == ActivationState::Activating {
                record.state = ActivationState::Active;
            }
        }
    }

    /// Mark the record `Deactivating` and hand out what is needed to undo it.
    /// The record stays visible until `forget` removes it.
    fn begin_deactivation(&self, handle: &ActivationHandle) -> Result<Teardown, ActivationError> {
        let mut records = self.records.lock();
        let record = records
            .get_mut(handle)
            .filter(|record| record.state != ActivationState::Deactivating)
            .ok_or_else(|| ActivationError::Unknown(handle.clone()))?;

        record.state = ActivationState::Deactivating;
        Ok(Teardown {
            generation: record.generation,
            commands: record.commands.clone(),
            endpoint: Arc::clone(&record.endpoint),
        })
    }

    fn forget(&self, handle: &ActivationHandle, generation: Uuid) {
        let mut records = self.records.lock();
        if records.get(handle).is_some_and(|r| r.generation == generation) {
            records.remove(handle);
        }
    }

    /// Run `f` under the tracker lock if the record with `generation` is
    /// still live and not being deactivated.
    fn with_live<R>(
        &self,
        handle: &ActivationHandle,
        generation: Uuid,
        f: impl FnOnce(&ActivationRecord) -> R,
    ) -> Option<R> {
        let records = self.records.lock();
        records
            .get(handle)
            .filter(|record| {
                record.generation == generation && record.state != ActivationState::Deactivating
            })
            .map(f)
    }
}

/// What `deactivate` needs once the record is marked `Deactivating`
struct Teardown {
    generation: Uuid,
    commands: Vec<Arc<Command>>,
    endpoint: Arc<dyn EndpointResource>,
}

// ============================================================================
// Service Trait
// ============================================================================

pub trait ActivationService: Send + Sync {
    /// Discover the descriptor's commands, record them under `handle` and
    /// schedule their registration. Returns before the registry is updated.
    fn activate(
        &self,
        handle: ActivationHandle,
        descriptor: EndpointDescriptor,
    ) -> Result<(), ActivationError>;

    /// Remove the handle's commands from the registry and release its endpoint.
    fn deactivate(&self, handle: &ActivationHandle) -> Result<(), ActivationError>;
}

// ============================================================================
// Service Implementation
// ============================================================================

pub struct StandardActivationService {
    tracker: Arc<ActivationTracker>,
    registry: Arc<CommandRegistry>,
    dispatcher: Arc<dyn WorkDispatcher>,
    event_bus: EventBus,
}

impl StandardActivationService {
    pub fn new(
        tracker: Arc<ActivationTracker>,
        registry: Arc<CommandRegistry>,
        dispatcher: Arc<dyn WorkDispatcher>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            tracker,
            registry,
            dispatcher,
            event_bus,
        }
    }

    pub fn tracker(&self) -> &Arc<ActivationTracker> {
        &self.tracker
    }

    fn schedule_registration(&self, handle: &ActivationHandle, generation: Uuid) {
        let tracker = Arc::clone(&self.tracker);
        let registry = Arc::clone(&self.registry);
        let event_bus = self.event_bus.clone();
        let unit_handle = handle.clone();

        let scheduled = self.dispatcher.schedule(Box::new(move || -> anyhow::Result<()> {
            let registered = tracker.with_live(&unit_handle, generation, |record| {
                registry.put_all(&record.commands);
                record.command_names()
            });

            match registered {
                Some(commands) => {
                    info!(handle = %unit_handle, count = commands.len(), "Activation commands registered");
                    event_bus.publish(ConnectorEvent::CommandsRegistered {
                        handle: unit_handle,
                        commands,
                        registered_at: Utc::now(),
                    });
                }
                None => {
                    debug!(handle = %unit_handle, "Activation gone before registration ran");
                    event_bus.publish(ConnectorEvent::RegistrationSkipped {
                        handle: unit_handle,
                        skipped_at: Utc::now(),
                    });
                }
            }
            Ok(())
        }));

        if let Err(e) = scheduled {
            error!(handle = %handle, error = %e, "Failed to schedule command registration");
        }
    }
}

impl ActivationService for StandardActivationService {
    fn activate(
        &self,
        handle: ActivationHandle,
        descriptor: EndpointDescriptor,
    ) -> Result<(), ActivationError> {
        if self.tracker.contains(&handle) {
            warn!(%handle, "Rejected duplicate activation");
            return Err(ActivationError::Duplicate(handle));
        }

        let context = DiscoveryContext::Endpoint {
            handle: handle.clone(),
            endpoint: Arc::clone(&descriptor.endpoint),
        };
        let commands: Vec<_> = discover(descriptor.provider.as_ref(), &context)
            .into_iter()
            .map(Arc::new)
            .collect();

        let record = ActivationRecord::new(handle.clone(), commands, descriptor.endpoint);
        let generation = record.generation;
        let names = record.command_names();

        // A concurrent activate of the same handle may have won since the check above
        self.tracker.insert(record)?;

        self.schedule_registration(&handle, generation);
        self.tracker.mark_active(&handle, generation);

        info!(%handle, commands = ?names, "Activation accepted");
        metrics::counter!("crest_activations_total").increment(1);
        self.event_bus.publish(ConnectorEvent::ActivationAccepted {
            handle,
            commands: names,
            accepted_at: Utc::now(),
        });

        Ok(())
    }

    fn deactivate(&self, handle: &ActivationHandle) -> Result<(), ActivationError> {
        let teardown = self.tracker.begin_deactivation(handle).inspect_err(|_| {
            warn!(%handle, "Rejected deactivation of unknown handle");
        })?;

        let removed = self.registry.remove_commands(&teardown.commands);
        let names: Vec<String> = teardown.commands.iter().map(|c| c.name().to_string()).collect();
        if removed < teardown.commands.len() {
            debug!(
                %handle,
                removed,
                contributed = teardown.commands.len(),
                "Some commands were not registered or had been replaced"
            );
        }

        teardown.endpoint.release();
        self.tracker.forget(handle, teardown.generation);

        info!(%handle, commands = ?names, "Activation removed");
        metrics::counter!("crest_deactivations_total").increment(1);
        self.event_bus.publish(ConnectorEvent::ActivationRemoved {
            handle: handle.clone(),
            commands: names,
            removed_at: Utc::now(),
        });

        Ok(())
    }
}
