// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Crest connector core
//!
//! Long-lived command-endpoint connector: console listeners serve a shared,
//! mutable command registry that external callers extend and shrink at
//! runtime through activations.
//!
//! # Architecture
//!
//! - **domain:** commands, activations, dispatch and session contracts, configuration
//! - **application:** activation service, connector lifecycle, authentication, built-ins
//! - **infrastructure:** registry, tokio work dispatcher, event bus, line session server

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
