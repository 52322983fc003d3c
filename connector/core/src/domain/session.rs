// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session server contract
//!
//! A session server binds one transport to a port and serves interactive
//! console sessions against the shared command registry. The connector only
//! drives it through [`SessionServerFactory`] and [`SessionServer`].

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::command::Command;
use crate::domain::security::SecurityCheck;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// SSH-like transport
    Ssh,
    /// Plain line-oriented (telnet-style) transport
    Line,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Ssh => f.write_str("ssh"),
            Transport::Line => f.write_str("line"),
        }
    }
}

/// Read side of the command registry, as seen by console sessions.
pub trait CommandResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<Command>>;

    fn snapshot(&self) -> Vec<Arc<Command>>;
}

/// Everything a session server needs at construction.
#[derive(Clone)]
pub struct SessionSettings {
    pub transport: Transport,
    pub prompt: String,
    pub bind_address: String,
    pub port: u16,
    pub resolver: Arc<dyn CommandResolver>,
    pub security: Arc<dyn SecurityCheck>,
    /// When false, sessions skip the login exchange
    pub require_login: bool,
}

impl fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionSettings")
            .field("transport", &self.transport)
            .field("prompt", &self.prompt)
            .field("bind_address", &self.bind_address)
            .field("port", &self.port)
            .field("require_login", &self.require_login)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait SessionServer: Send + Sync {
    fn transport(&self) -> Transport;

    /// Bind and begin accepting sessions.
    async fn start(&mut self) -> Result<(), SessionError>;

    /// Stop accepting and tear down sessions. Idempotent; succeeds when the
    /// server was never started.
    async fn stop(&mut self) -> Result<(), SessionError>;

    /// Bound address while running.
    fn local_addr(&self) -> Option<SocketAddr>;
}

pub trait SessionServerFactory: Send + Sync {
    fn create(&self, settings: SessionSettings) -> Result<Box<dyn SessionServer>, SessionError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no session server available for the {0} transport")]
    UnsupportedTransport(Transport),

    #[error("failed to stop session server: {0}")]
    Stop(String),
}
