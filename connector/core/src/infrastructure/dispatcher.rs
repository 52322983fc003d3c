// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tokio-backed Work Dispatcher
//!
//! Owns a dedicated runtime whose blocking pool is the connector's worker
//! pool. A semaphore bounds queued plus running units; a unit that cannot
//! get a permit is rejected instead of queued without limit.
//!
//! Units are run under `catch_unwind`, so a failing or panicking unit never
//! takes a worker thread down and never reaches the submitter of a
//! scheduled unit.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{Semaphore, TryAcquireError};
use tracing::{debug, error, warn};

use crate::domain::connector_config::WorkerConfig;
use crate::domain::dispatcher::{DispatchError, Work, WorkDispatcher};

type Completion = mpsc::SyncSender<Result<(), DispatchError>>;

pub struct TokioWorkDispatcher {
    runtime: Mutex<Option<Runtime>>,
    handle: Handle,
    permits: Arc<Semaphore>,
    capacity: usize,
    execute_timeout: Option<Duration>,
}

impl TokioWorkDispatcher {
    pub fn from_config(config: &WorkerConfig) -> std::io::Result<Self> {
        Self::new(config.threads, config.max_pending, config.execute_timeout())
    }

    pub fn new(
        threads: usize,
        max_pending: usize,
        execute_timeout: Option<Duration>,
    ) -> std::io::Result<Self> {
        let threads = threads.max(1);
        let capacity = max_pending.max(1);

        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(threads)
            .thread_name("crest-worker")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();

        debug!(threads, capacity, ?execute_timeout, "Work dispatcher started");

        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            handle,
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            execute_timeout,
        })
    }

    /// Units accepted but not yet finished
    pub fn pending(&self) -> usize {
        self.capacity
            .saturating_sub(self.permits.available_permits())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reject new work and tear down the worker runtime. Idempotent.
    ///
    /// Units still queued are dropped; a caller blocked in `execute` on one
    /// of them observes `Disconnected`.
    pub fn shutdown(&self) {
        self.permits.close();
        if let Some(runtime) = self.runtime.lock().take() {
            debug!("Work dispatcher shutting down");
            runtime.shutdown_background();
        }
    }

    fn submit(&self, work: Work, completion: Option<Completion>) -> Result<(), DispatchError> {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::Closed) => return Err(DispatchError::Unavailable),
            Err(TryAcquireError::NoPermits) => {
                metrics::counter!("crest_dispatch_rejected_total").increment(1);
                return Err(DispatchError::Saturated {
                    capacity: self.capacity,
                });
            }
        };

        self.handle.spawn_blocking(move || {
            let _permit = permit;
            let outcome = run_unit(work);
            match completion {
                Some(tx) => {
                    // The submitter may have timed out and gone away
                    let _ = tx.send(outcome);
                }
                None => {
                    if let Err(e) = outcome {
                        warn!(error = %e, "Scheduled work failed");
                    }
                }
            }
        });

        Ok(())
    }
}

impl WorkDispatcher for TokioWorkDispatcher {
    fn schedule(&self, work: Work) -> Result<(), DispatchError> {
        self.submit(work, None)
    }

    fn execute(&self, work: Work) -> Result<(), DispatchError> {
        let (tx, rx) = mpsc::sync_channel(1);
        self.submit(work, Some(tx))?;

        match self.execute_timeout {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(mpsc::RecvTimeoutError::Timeout) => Err(DispatchError::TimedOut(timeout)),
                Err(mpsc::RecvTimeoutError::Disconnected) => Err(DispatchError::Disconnected),
            },
            None => rx.recv().map_err(|_| DispatchError::Disconnected)?,
        }
    }

    fn shutdown(&self) {
        TokioWorkDispatcher::shutdown(self);
    }
}

impl Drop for TokioWorkDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_unit(work: Work) -> Result<(), DispatchError> {
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(DispatchError::WorkFailed(format!("{:#}", e))),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = %message, "Work unit panicked");
            Err(DispatchError::Panicked(message))
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::dispatcher::WorkDispatcherExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;

    #[test]
    fn test_execute_runs_on_worker_thread() {
        let dispatcher = TokioWorkDispatcher::new(2, 8, None).unwrap();
        let caller = std::thread::current().id();

        let ran_elsewhere = dispatcher
            .execute_with(move || Ok(std::thread::current().id() != caller))
            .unwrap();
        assert!(ran_elsewhere);
    }

    #[test]
    fn test_execute_reports_unit_failure_and_panic() {
        let dispatcher = TokioWorkDispatcher::new(1, 8, None).unwrap();

        let failed = dispatcher.execute(Box::new(|| -> anyhow::Result<()> { anyhow::bail!("denied") }));
        assert_eq!(failed, Err(DispatchError::WorkFailed("denied".to_string())));

        let panicked = dispatcher.execute(Box::new(|| -> anyhow::Result<()> { panic!("worker blew up") }));
        assert_eq!(panicked, Err(DispatchError::Panicked("worker blew up".to_string())));

        // The pool survives both
        assert_eq!(dispatcher.execute_with(|| Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_schedule_runs_eventually() {
        let dispatcher = TokioWorkDispatcher::new(2, 8, None).unwrap();
        let (tx, rx) = mpsc::channel();

        dispatcher
            .schedule(Box::new(move || -> anyhow::Result<()> {
                tx.send(()).ok();
                Ok(())
            }))
            .unwrap();

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_scheduled_failure_does_not_reach_caller() {
        let dispatcher = TokioWorkDispatcher::new(1, 8, None).unwrap();
        assert!(dispatcher.schedule(Box::new(|| -> anyhow::Result<()> { panic!("ignored") })).is_ok());
        assert!(dispatcher.schedule(Box::new(|| -> anyhow::Result<()> { anyhow::bail!("ignored") })).is_ok());
        assert_eq!(dispatcher.execute_with(|| Ok("alive")).unwrap(), "alive");
    }

    #[test]
    fn test_saturated_pool_rejects() {
        let dispatcher = TokioWorkDispatcher::new(1, 1, None).unwrap();
        let gate = Arc::new(Barrier::new(2));

        let held = Arc::clone(&gate);
        dispatcher
            .schedule(Box::new(move || -> anyhow::Result<()> {
                held.wait();
                Ok(())
            }))
            .unwrap();

        let rejected = dispatcher.schedule(Box::new(|| -> anyhow::Result<()> { Ok(()) }));
        assert_eq!(rejected, Err(DispatchError::Saturated { capacity: 1 }));
        assert_eq!(dispatcher.pending(), 1);

        gate.wait();
    }

    #[test]
    fn test_execute_timeout() {
        let dispatcher = TokioWorkDispatcher::new(1, 4, Some(Duration::from_millis(50))).unwrap();
        let result = dispatcher.execute(Box::new(|| -> anyhow::Result<()> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        }));
        assert_eq!(result, Err(DispatchError::TimedOut(Duration::from_millis(50))));
    }

    #[test]
    fn test_shutdown_makes_dispatcher_unavailable() {
        let dispatcher = TokioWorkDispatcher::new(1, 4, None).unwrap();
        dispatcher.shutdown();
        dispatcher.shutdown();

        assert_eq!(dispatcher.schedule(Box::new(|| -> anyhow::Result<()> { Ok(()) })), Err(DispatchError::Unavailable));
        assert_eq!(dispatcher.execute(Box::new(|| -> anyhow::Result<()> { Ok(()) })), Err(DispatchError::Unavailable));
    }

    #[test]
    fn test_concurrent_execute_callers() {
        let dispatcher = Arc::new(TokioWorkDispatcher::new(4, 64, None).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                let counter = Arc::clone(&counter);
                std::thread::spawn(move || {
                    dispatcher
                        .execute(Box::new(move || -> anyhow::Result<()> {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        }))
                        .unwrap();
                })
            })
            .collect();

        for caller in callers {
            caller.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
