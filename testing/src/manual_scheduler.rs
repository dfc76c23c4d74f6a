//! A scheduler that drains only when the test says so.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use reflow_core::StoreError;
use reflow_runtime::{Tick, TickScheduler};
use thiserror::Error;

/// Errors from pumping a [`ManualScheduler`].
#[derive(Error, Debug)]
pub enum PumpError {
    /// `run_next` was called with no tick pending, which usually means
    /// the dispatch under test never reached the queue.
    #[error("no drain tick is pending")]
    NoTickPending,

    /// The drained batch failed and was purged.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Buffers requested drain ticks for explicit execution.
///
/// Share it with the store via
/// [`StoreConfig::shared_scheduler`](reflow_runtime::StoreConfig::shared_scheduler);
/// the test keeps its own handle for pumping.
#[derive(Default)]
pub struct ManualScheduler {
    ticks: Mutex<VecDeque<Tick>>,
}

impl ManualScheduler {
    /// Create an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ticks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Run the next pending tick.
    ///
    /// # Errors
    ///
    /// [`PumpError::NoTickPending`] when nothing was scheduled, or the
    /// batch error when the drained batch was purged.
    pub fn run_next(&self) -> Result<(), PumpError> {
        let tick = self.lock().pop_front().ok_or(PumpError::NoTickPending)?;
        tick.run()?;
        Ok(())
    }

    /// Run pending ticks until none remain, including ticks scheduled by
    /// the ticks themselves (follow-up batches). Returns the number of
    /// ticks run.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first batch error.
    pub fn run_all(&self) -> Result<usize, StoreError> {
        let mut ran = 0;
        loop {
            // Taken in its own statement so the lock is released before
            // the tick runs; ticks re-enter `schedule` to request the
            // next batch.
            let next = self.lock().pop_front();
            let Some(tick) = next else {
                break;
            };
            tick.run()?;
            ran += 1;
        }
        Ok(ran)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Tick>> {
        self.ticks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TickScheduler for ManualScheduler {
    fn schedule(&self, tick: Tick) {
        self.lock().push_back(tick);
    }
}

impl std::fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}
