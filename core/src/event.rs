//! Events dispatched to the store.

use std::any::Any;
use std::sync::Arc;

/// A cheaply cloneable, type-erased value.
///
/// Used for event payloads, custom coeffects, effect payloads, and cached
/// subscription values. Consumers downcast back to the concrete type.
pub type DynValue = Arc<dyn Any + Send + Sync>;

/// A named input to the store.
///
/// An event identifies which registered event handler (and its interceptor
/// chain) to invoke, optionally carrying a typed payload. Events are
/// immutable once constructed; clones share the payload.
///
/// # Example
///
/// ```
/// use reflow_core::Event;
///
/// let event = Event::with_payload("add", 5_i64);
/// assert_eq!(event.id(), "add");
/// assert_eq!(event.payload::<i64>(), Some(&5));
/// assert_eq!(event.payload::<String>(), None);
/// ```
#[derive(Clone)]
pub struct Event {
    id: String,
    payload: Option<DynValue>,
}

impl Event {
    /// Create an event with no payload.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: None,
        }
    }

    /// Create an event carrying a payload.
    #[must_use]
    pub fn with_payload<P: Send + Sync + 'static>(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload: Some(Arc::new(payload)),
        }
    }

    /// The event id, used to look up the registered handler.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The payload, downcast to `P`.
    ///
    /// Returns `None` when there is no payload or it has a different type.
    #[must_use]
    pub fn payload<P: 'static>(&self) -> Option<&P> {
        self.payload.as_ref()?.downcast_ref()
    }

    /// Whether this event carries a payload.
    #[must_use]
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }
}

impl From<&str> for Event {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for Event {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.payload.is_some() {
            write!(f, "Event({:?}, <payload>)", self.id)
        } else {
            write!(f, "Event({:?})", self.id)
        }
    }
}
