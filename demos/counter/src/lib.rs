//! # Counter Example
//!
//! A simple counter demonstrating the reflow event-processing
//! architecture.
//!
//! This example showcases:
//! - Registering state-transforming event handlers
//! - Dispatching events with and without payloads
//! - Cached subscriptions with change-only notification
//!
//! ## Example
//!
//! ```
//! use counter::{CounterApp, wire};
//! use reflow_runtime::{Store, StoreConfig, SyncScheduler};
//!
//! # fn main() -> Result<(), reflow_runtime::StoreError> {
//! let store = Store::with_config(
//!     CounterApp::default(),
//!     StoreConfig::new().scheduler(SyncScheduler),
//! );
//! wire(&store);
//!
//! store.dispatch("increment")?;
//! assert_eq!(store.state().count, 1);
//! # Ok(())
//! # }
//! ```

use reflow_runtime::Store;

/// Counter application state.
///
/// The state is just a simple count. In a real application, this might
/// contain more complex domain data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CounterApp {
    /// Current count value.
    pub count: i64,
}

/// Register the counter's event handlers and subscriptions.
///
/// Events:
/// - `increment` / `decrement`: adjust the count by the `i64` payload,
///   defaulting to 1 when the event carries none.
/// - `reset`: set the count back to 0.
///
/// Subscriptions:
/// - `count`: the current count.
/// - `parity`: `"even"` or `"odd"`, notifying only when it flips.
pub fn wire(store: &Store<CounterApp>) {
    store.register_event_db("increment", |mut app, event| {
        app.count += event.payload::<i64>().copied().unwrap_or(1);
        app
    });
    store.register_event_db("decrement", |mut app, event| {
        app.count -= event.payload::<i64>().copied().unwrap_or(1);
        app
    });
    store.register_event_db("reset", |mut app, _| {
        app.count = 0;
        app
    });

    store.register_subscription("count", |app, _| app.count);
    store.register_subscription("parity", |app, _| {
        if app.count % 2 == 0 { "even" } else { "odd" }
    });
}
