//! Value recorder for watcher and callback assertions.

use std::sync::{Arc, Mutex, PoisonError};

/// Collects values pushed from watchers, post-event callbacks, or effect
/// handlers, for later assertion. Clones share the same buffer, so one
/// half can be moved into a closure while the test keeps the other.
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T> Recorder<T> {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append one value.
    pub fn record(&self, value: T) {
        self.lock().push(value);
    }

    /// Number of recorded values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop all recorded values.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<T>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Clone> Recorder<T> {
    /// Snapshot the recorded values in order.
    #[must_use]
    pub fn values(&self) -> Vec<T> {
        self.lock().clone()
    }
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            values: Arc::clone(&self.values),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Recorder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recorder").field("values", &*self.lock()).finish()
    }
}
