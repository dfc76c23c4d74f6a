//! Store runtime: the event queue, handler registry, subscription cache,
//! and tick schedulers behind [`Store`].
//!
//! # Dispatch lifecycle
//!
//! 1. [`Store::dispatch`] validates the event id and pushes the event
//!    onto the FIFO queue; the first push schedules a drain tick.
//! 2. The scheduler runs the tick, which drains exactly the events that
//!    were buffered when it began. Events dispatched mid-batch wait for
//!    the next tick.
//! 3. Each event runs through its interceptor chain; the built-in
//!    `run-effects` step applies the resulting effects, resetting the
//!    state atom and refreshing cached subscriptions when the state
//!    actually changed.
//! 4. A handler error purges the rest of the batch and surfaces at the
//!    scheduler boundary.
//!
//! # Example
//!
//! ```
//! use reflow_runtime::{Store, StoreConfig, SyncScheduler};
//!
//! # fn main() -> Result<(), reflow_runtime::StoreError> {
//! let store = Store::with_config(1_i64, StoreConfig::new().scheduler(SyncScheduler));
//! store.register_event_db("double", |db, _| db * 2);
//! store.register_subscription("count", |db, _| *db);
//!
//! store.dispatch("double")?;
//! assert_eq!(store.state(), 2);
//!
//! let count = store.subscribe::<i64>("count")?;
//! assert_eq!(count.deref(), 2);
//! # Ok(())
//! # }
//! ```

mod event_queue;
pub mod interceptors;
mod registry;
mod scheduler;
mod store;
mod subscription;

pub use reflow_core::{
    Atom, Coeffects, Context, Effects, Event, Interceptor, Query, StoreError, Unwatch,
};
pub use scheduler::{SyncScheduler, Tick, TickScheduler, TokioScheduler};
pub use store::{Store, StoreConfig};
pub use subscription::Subscription;
