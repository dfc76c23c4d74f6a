//! Drain-tick scheduling.
//!
//! The queue never drains inline with `dispatch`: it asks a scheduler to
//! run the drain on a later tick, so a handler that dispatches sees its
//! own event processed only after the current batch completes. Schedulers
//! only decide *when* a tick runs; the store owns *what* it does.

use std::fmt;

use reflow_core::StoreError;
use tracing::error;

/// A single pending drain pass, handed to a [`TickScheduler`].
///
/// Returns `Err` when the batch was purged by a failing handler. The
/// production schedulers log the error at this boundary; the manual test
/// scheduler in reflow-testing hands it back to the test instead.
pub struct Tick(Box<dyn FnOnce() -> Result<(), StoreError> + Send + 'static>);

impl Tick {
    pub(crate) fn new(run: impl FnOnce() -> Result<(), StoreError> + Send + 'static) -> Self {
        Self(Box::new(run))
    }

    /// Execute the drain pass.
    ///
    /// # Errors
    ///
    /// Returns the error that purged the batch, if any handler failed.
    pub fn run(self) -> Result<(), StoreError> {
        (self.0)()
    }
}

impl fmt::Debug for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tick")
    }
}

/// Decides when a requested drain tick executes.
///
/// The store requests at most one outstanding tick at a time, so
/// implementations never need to coalesce.
pub trait TickScheduler: Send + Sync {
    /// Arrange for `tick` to run. Implementations must run it exactly
    /// once (or drop it, for test schedulers that are never pumped).
    fn schedule(&self, tick: Tick);
}

/// Schedules ticks onto the ambient tokio runtime.
///
/// This is the default scheduler: dispatch returns immediately and the
/// batch drains on a spawned task.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl TickScheduler for TokioScheduler {
    fn schedule(&self, tick: Tick) {
        tokio::spawn(async move {
            if let Err(cause) = tick.run() {
                error!(%cause, "event batch purged");
            }
        });
    }
}

/// Runs each tick immediately on the calling thread.
///
/// Useful outside an async runtime: `dispatch` becomes fully synchronous
/// and the batch is drained before it returns. Batch boundaries still
/// hold, because a dispatch from inside a running batch finds the queue
/// `Running` and schedules nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncScheduler;

impl TickScheduler for SyncScheduler {
    fn schedule(&self, tick: Tick) {
        if let Err(cause) = tick.run() {
            error!(%cause, "event batch purged");
        }
    }
}
