// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Activations
//!
//! An activation associates an external endpoint with the commands
//! discovered from it. The handle is supplied by the caller and is only ever
//! used as a key; the record owns everything needed to undo the activation.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::command::{Command, InvocationError};
use crate::domain::discovery::CommandProvider;

/// Opaque key for one registration batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivationHandle(String);

impl ActivationHandle {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActivationHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActivationHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ActivationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationState {
    /// Record created, registration not yet handed to the dispatcher
    Activating,
    /// Registration scheduled; commands appear once the work has run
    Active,
    /// Commands being removed and the endpoint released; the record leaves
    /// the tracker once both are done
    Deactivating,
}

impl fmt::Display for ActivationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActivationState::Activating => "activating",
            ActivationState::Active => "active",
            ActivationState::Deactivating => "deactivating",
        };
        f.write_str(label)
    }
}

/// The external object standing behind an activation.
///
/// `before_delivery`/`after_delivery` bracket every invocation of a command
/// contributed by this endpoint; `after_delivery` runs on every exit path.
/// `release` is called exactly once, when the activation is deactivated.
pub trait EndpointResource: Send + Sync {
    fn before_delivery(&self, _operation: &str) -> Result<(), InvocationError> {
        Ok(())
    }

    fn after_delivery(&self) {}

    fn release(&self);
}

/// What the caller hands to `activate`: the endpoint plus the provider its
/// commands are discovered from.
#[derive(Clone)]
pub struct EndpointDescriptor {
    pub provider: Arc<dyn CommandProvider>,
    pub endpoint: Arc<dyn EndpointResource>,
}

impl EndpointDescriptor {
    pub fn new(provider: Arc<dyn CommandProvider>, endpoint: Arc<dyn EndpointResource>) -> Self {
        Self { provider, endpoint }
    }
}

impl fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointDescriptor").finish_non_exhaustive()
    }
}

pub struct ActivationRecord {
    pub handle: ActivationHandle,
    /// Distinguishes successive activations that reuse the same handle
    pub generation: Uuid,
    pub commands: Vec<Arc<Command>>,
    pub endpoint: Arc<dyn EndpointResource>,
    pub state: ActivationState,
    pub activated_at: DateTime<Utc>,
}

impl ActivationRecord {
    pub fn new(
        handle: ActivationHandle,
        commands: Vec<Arc<Command>>,
        endpoint: Arc<dyn EndpointResource>,
    ) -> Self {
        Self {
            handle,
            generation: Uuid::new_v4(),
            commands,
            endpoint,
            state: ActivationState::Activating,
            activated_at: Utc::now(),
        }
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands.iter().map(|c| c.name().to_string()).collect()
    }
}

impl fmt::Debug for ActivationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationRecord")
            .field("handle", &self.handle)
            .field("generation", &self.generation)
            .field("commands", &self.command_names())
            .field("state", &self.state)
            .field("activated_at", &self.activated_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    #[error("duplicate activation: handle '{0}' is already active")]
    Duplicate(ActivationHandle),

    #[error("unknown activation: no live record for handle '{0}'")]
    Unknown(ActivationHandle),
}
