// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod authenticator;
pub mod dispatcher;
pub mod event_bus;
pub mod registry;
pub mod session;

pub use authenticator::{hash_password, StaticAuthenticator};
pub use dispatcher::TokioWorkDispatcher;
pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use registry::CommandRegistry;
pub use session::{LineSessionServer, TcpSessionServerFactory};
