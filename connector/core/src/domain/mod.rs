// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Types and contracts shared by every layer of the connector.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Commands, activations, dispatch and session contracts

pub mod activation;
pub mod command;
pub mod connector_config;
pub mod discovery;
pub mod dispatcher;
pub mod events;
pub mod security;
pub mod session;
