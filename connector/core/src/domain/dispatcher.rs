// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Work Dispatcher contract
//!
//! Abstracts "run this unit of work on the host's worker pool". Two modes:
//!
//! | Mode | Caller | Failures |
//! |------|--------|----------|
//! | [`WorkDispatcher::schedule`] | returns immediately | logged by the dispatcher, never propagated |
//! | [`WorkDispatcher::execute`] | blocks until the unit completes on a worker | returned to the blocked caller |
//!
//! `execute` blocks the calling OS thread. Call it from a plain thread or a
//! blocking-pool task, never directly from an async task, and never from a
//! unit already running on the same dispatcher when the pool may be full.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// One unit of work. Errors and panics are caught by the dispatcher.
pub type Work = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

pub trait WorkDispatcher: Send + Sync {
    /// Fire-and-forget submission.
    fn schedule(&self, work: Work) -> Result<(), DispatchError>;

    /// Submit and block the calling thread until the unit has run.
    fn execute(&self, work: Work) -> Result<(), DispatchError>;

    /// Stop accepting work. Dispatchers owned by the host may ignore this.
    fn shutdown(&self) {}
}

/// Typed result hand-off on top of [`WorkDispatcher::execute`].
pub trait WorkDispatcherExt: WorkDispatcher {
    fn execute_with<T, F>(&self, f: F) -> Result<T, DispatchError>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        let slot: Arc<Mutex<Option<T>>> = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);

        self.execute(Box::new(move || -> anyhow::Result<()> {
            let value = f()?;
            *sink.lock() = Some(value);
            Ok(())
        }))?;

        let value = slot.lock().take();
        value.ok_or(DispatchError::Disconnected)
    }
}

impl<D: WorkDispatcher + ?Sized> WorkDispatcherExt for D {}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("work dispatcher is unavailable")]
    Unavailable,

    #[error("work dispatcher is saturated ({capacity} units pending)")]
    Saturated { capacity: usize },

    #[error("work unit failed: {0}")]
    WorkFailed(String),

    #[error("work unit panicked: {0}")]
    Panicked(String),

    #[error("work unit did not complete within {0:?}")]
    TimedOut(Duration),

    #[error("work unit completed without reporting a result")]
    Disconnected,
}
