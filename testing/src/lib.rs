//! Deterministic test utilities for reflow stores.
//!
//! The pieces here remove all timing from store tests:
//!
//! - [`ManualScheduler`] buffers drain ticks instead of running them, so
//!   a test decides exactly when a batch drains and observes batch
//!   errors as return values.
//! - [`Recorder`] collects values from watchers and post-event callbacks
//!   for later assertion.
//! - [`init_tracing`] wires a subscriber honoring `RUST_LOG`, safe to
//!   call from every test.
//!
//! ```
//! use std::sync::Arc;
//! use reflow_runtime::{Store, StoreConfig};
//! use reflow_testing::ManualScheduler;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let scheduler = Arc::new(ManualScheduler::new());
//! let store = Store::with_config(
//!     1_i64,
//!     StoreConfig::new().shared_scheduler(scheduler.clone()),
//! );
//! store.register_event_db("double", |db, _| db * 2);
//!
//! store.dispatch("double")?;
//! assert_eq!(store.state(), 1); // nothing drains until the test says so
//!
//! scheduler.run_next()?;
//! assert_eq!(store.state(), 2);
//! # Ok(())
//! # }
//! ```

mod manual_scheduler;
mod recorder;

pub use manual_scheduler::{ManualScheduler, PumpError};
pub use recorder::Recorder;

/// Initialize a tracing subscriber honoring `RUST_LOG`.
///
/// Safe to call more than once; only the first call installs.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
