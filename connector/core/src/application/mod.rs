// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application services
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Activation protocol, dispatcher-backed login, built-in
//!   commands and the connector lifecycle

pub mod activation;
pub mod authentication;
pub mod builtins;
pub mod lifecycle;

pub use activation::{ActivationService, ActivationSummary, ActivationTracker, StandardActivationService};
pub use authentication::DispatchedSecurityCheck;
pub use builtins::BuiltinCommands;
pub use lifecycle::{Connector, ConnectorError, ConnectorState, ShutdownReport, StopFailure};
