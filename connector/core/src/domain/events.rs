// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::activation::ActivationHandle;
use crate::domain::session::Transport;

/// Connector events published on the event bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ConnectorEvent {
    ListenerStarted {
        transport: Transport,
        address: String,
        started_at: DateTime<Utc>,
    },
    ListenerStopped {
        transport: Transport,
        stopped_at: DateTime<Utc>,
    },
    ListenerStopFailed {
        transport: Transport,
        error: String,
        failed_at: DateTime<Utc>,
    },
    ActivationAccepted {
        handle: ActivationHandle,
        commands: Vec<String>,
        accepted_at: DateTime<Utc>,
    },
    /// Scheduled registration work has landed in the registry
    CommandsRegistered {
        handle: ActivationHandle,
        commands: Vec<String>,
        registered_at: DateTime<Utc>,
    },
    /// Scheduled registration found its activation already gone
    RegistrationSkipped {
        handle: ActivationHandle,
        skipped_at: DateTime<Utc>,
    },
    ActivationRemoved {
        handle: ActivationHandle,
        commands: Vec<String>,
        removed_at: DateTime<Utc>,
    },
    AuthenticationCompleted {
        principal: String,
        allowed: bool,
        completed_at: DateTime<Utc>,
    },
}

impl ConnectorEvent {
    /// Activation handle the event refers to, if any
    pub fn handle(&self) -> Option<&ActivationHandle> {
        match self {
            ConnectorEvent::ActivationAccepted { handle, .. }
            | ConnectorEvent::CommandsRegistered { handle, .. }
            | ConnectorEvent::RegistrationSkipped { handle, .. }
            | ConnectorEvent::ActivationRemoved { handle, .. } => Some(handle),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_and_handle() {
        let event = ConnectorEvent::CommandsRegistered {
            handle: ActivationHandle::new("ep1"),
            commands: vec!["status".to_string()],
            registered_at: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "commands_registered");
        assert_eq!(json["handle"], "ep1");
        assert_eq!(event.handle(), Some(&ActivationHandle::new("ep1")));

        let started = ConnectorEvent::ListenerStarted {
            transport: Transport::Line,
            address: "127.0.0.1:2020".to_string(),
            started_at: Utc::now(),
        };
        assert_eq!(serde_json::to_value(&started).unwrap()["transport"], "line");
        assert!(started.handle().is_none());
    }
}
