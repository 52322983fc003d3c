// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Session server adapters
//!
//! Only the line-oriented transport ships here. SSH sessions need host keys
//! and a protocol stack of their own; embedders provide them through their
//! own [`SessionServerFactory`].

pub mod line;

pub use line::LineSessionServer;

use crate::domain::session::{
    SessionError, SessionServer, SessionServerFactory, SessionSettings, Transport,
};

/// Default factory: plain TCP line sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpSessionServerFactory;

impl SessionServerFactory for TcpSessionServerFactory {
    fn create(&self, settings: SessionSettings) -> Result<Box<dyn SessionServer>, SessionError> {
        match settings.transport {
            Transport::Line => Ok(Box::new(LineSessionServer::new(settings))),
            Transport::Ssh => Err(SessionError::UnsupportedTransport(Transport::Ssh)),
        }
    }
}
