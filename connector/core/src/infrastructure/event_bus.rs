// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Connector Events
//
// In-memory broadcast of listener, activation and authentication events.
// Nothing is persisted; a receiver that falls behind loses the oldest events.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::activation::ActivationHandle;
use crate::domain::events::ConnectorEvent;

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ConnectorEvent>>,
}

impl EventBus {
    /// Create a new event bus buffering up to `capacity` events per receiver
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, event: ConnectorEvent) {
        debug!(?event, "Publishing connector event");

        // send() only fails when nobody is subscribed
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to events about a single activation handle
    pub fn subscribe_activation(&self, handle: ActivationHandle) -> ActivationEventReceiver {
        ActivationEventReceiver {
            inner: self.subscribe(),
            handle,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<ConnectorEvent>,
}

impl EventReceiver {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Result<ConnectorEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<ConnectorEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

/// Receiver filtered to one activation handle
pub struct ActivationEventReceiver {
    inner: EventReceiver,
    handle: ActivationHandle,
}

impl ActivationEventReceiver {
    pub async fn recv(&mut self) -> Result<ConnectorEvent, EventBusError> {
        loop {
            let event = self.inner.recv().await?;
            if event.handle() == Some(&self.handle) {
                return Ok(event);
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
