//! Interceptor-chain execution contexts.
//!
//! A [`Context`] travels through an interceptor chain twice: once forward
//! (before-phase) and once in reverse (after-phase). It carries the
//! coeffects the event handler reads and the effects it produces. Contexts
//! move by value through hooks; a hook that wants to change something
//! returns a new (possibly field-updated) context, and nothing else can
//! observe the intermediate states.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::event::{DynValue, Event};
use crate::interceptor::Interceptor;

/// Named inputs available to an event handler.
///
/// The built-in `db` coeffect (the current application state) and the
/// triggering event have typed slots; anything else injected by coeffect
/// providers lives in a type-erased map.
pub struct Coeffects<Db> {
    event: Event,
    db: Option<Db>,
    extras: HashMap<String, DynValue>,
}

impl<Db> Coeffects<Db> {
    /// Create coeffects seeded with the triggering event.
    #[must_use]
    pub fn new(event: Event) -> Self {
        Self {
            event,
            db: None,
            extras: HashMap::new(),
        }
    }

    /// The event being processed.
    #[must_use]
    pub fn event(&self) -> &Event {
        &self.event
    }

    /// The application state snapshot injected by the `db` coeffect.
    #[must_use]
    pub fn db(&self) -> Option<&Db> {
        self.db.as_ref()
    }

    /// Inject the application state snapshot.
    pub fn set_db(&mut self, db: Db) {
        self.db = Some(db);
    }

    /// Inject a custom named coeffect value.
    pub fn insert<P: Send + Sync + 'static>(&mut self, id: impl Into<String>, value: P) {
        self.extras.insert(id.into(), Arc::new(value));
    }

    /// Look up a custom coeffect value, downcast to `P`.
    #[must_use]
    pub fn get<P: 'static>(&self, id: &str) -> Option<&P> {
        self.extras.get(id)?.downcast_ref()
    }
}

impl<Db: std::fmt::Debug> std::fmt::Debug for Coeffects<Db> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coeffects")
            .field("event", &self.event)
            .field("db", &self.db)
            .field("extras", &self.extras.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Named outputs an event handler (or interceptor) wants applied.
///
/// The built-in `db` effect (replace the application state) has a typed
/// slot; custom effects are an insertion-ordered list of
/// `(effect id, payload)` pairs, applied in that order by the store's
/// `run-effects` interceptor.
pub struct Effects<Db> {
    db: Option<Db>,
    extras: smallvec::SmallVec<[(String, DynValue); 4]>,
}

impl<Db> Effects<Db> {
    /// Create an empty effects map (the explicit "no effects" signal).
    #[must_use]
    pub fn new() -> Self {
        Self {
            db: None,
            extras: smallvec::SmallVec::new(),
        }
    }

    /// The pending `db` effect, if any.
    #[must_use]
    pub fn db(&self) -> Option<&Db> {
        self.db.as_ref()
    }

    /// Request the `db` effect: replace application state with `db`.
    pub fn set_db(&mut self, db: Db) {
        self.db = Some(db);
    }

    /// Remove and return the pending `db` effect.
    pub fn take_db(&mut self) -> Option<Db> {
        self.db.take()
    }

    /// Request a custom effect with a typed payload.
    pub fn push<P: Send + Sync + 'static>(&mut self, id: impl Into<String>, payload: P) {
        self.extras.push((id.into(), Arc::new(payload)));
    }

    /// Custom effects in insertion order.
    pub fn extras(&self) -> impl Iterator<Item = (&str, &DynValue)> {
        self.extras.iter().map(|(id, payload)| (id.as_str(), payload))
    }

    /// Remove and return the custom effects in insertion order.
    #[must_use]
    pub fn drain_extras(&mut self) -> smallvec::SmallVec<[(String, DynValue); 4]> {
        std::mem::take(&mut self.extras)
    }

    /// Drop every pending effect, including `db`.
    pub fn clear(&mut self) {
        self.db = None;
        self.extras.clear();
    }

    /// Whether no effect is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.db.is_none() && self.extras.is_empty()
    }
}

impl<Db> Default for Effects<Db> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Db: std::fmt::Debug> std::fmt::Debug for Effects<Db> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effects")
            .field("db", &self.db)
            .field(
                "extras",
                &self.extras.iter().map(|(id, _)| id).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// The unit of interceptor-chain execution.
///
/// `queue` holds the interceptors not yet run in the current phase and
/// `stack` the ones already run; together they always partition the full
/// chain. Hooks receive the context by value and return it (possibly
/// replaced), so every step is a fresh value and earlier references cannot
/// be mutated out from under anyone.
pub struct Context<Db> {
    queue: VecDeque<Arc<Interceptor<Db>>>,
    stack: Vec<Arc<Interceptor<Db>>>,
    /// Named inputs for the handler.
    pub coeffects: Coeffects<Db>,
    /// Named outputs to apply after the handler.
    pub effects: Effects<Db>,
}

impl<Db> Context<Db> {
    /// Create a context for running `chain` against `event`.
    #[must_use]
    pub fn new(chain: &[Arc<Interceptor<Db>>], event: Event) -> Self {
        Self {
            queue: chain.iter().cloned().collect(),
            stack: Vec::with_capacity(chain.len()),
            coeffects: Coeffects::new(event),
            effects: Effects::new(),
        }
    }

    /// Interceptors not yet run in the current phase.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Interceptors already run in the current phase.
    #[must_use]
    pub fn stacked_len(&self) -> usize {
        self.stack.len()
    }

    pub(crate) fn pop_queued(&mut self) -> Option<Arc<Interceptor<Db>>> {
        self.queue.pop_front()
    }

    pub(crate) fn push_stacked(&mut self, interceptor: Arc<Interceptor<Db>>) {
        self.stack.push(interceptor);
    }

    /// Move the stack back into the queue in reverse invocation order.
    pub(crate) fn unwind_stack_into_queue(&mut self) {
        self.queue = self.stack.drain(..).rev().collect();
    }
}

impl<Db: std::fmt::Debug> std::fmt::Debug for Context<Db> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("queued", &self.queue.len())
            .field("stacked", &self.stack.len())
            .field("coeffects", &self.coeffects)
            .field("effects", &self.effects)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coeffect_extras_roundtrip() {
        let mut coeffects: Coeffects<i32> = Coeffects::new(Event::new("x"));
        coeffects.insert("now", 1234_u64);
        assert_eq!(coeffects.get::<u64>("now"), Some(&1234));
        assert_eq!(coeffects.get::<u64>("missing"), None);
        assert_eq!(coeffects.get::<i32>("now"), None);
    }

    #[test]
    fn effects_preserve_insertion_order() {
        let mut effects: Effects<i32> = Effects::new();
        effects.push("first", 1_u8);
        effects.push("second", 2_u8);
        effects.push("third", 3_u8);

        let ids: Vec<_> = effects.extras().map(|(id, _)| id.to_owned()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn clear_drops_all_pending_effects() {
        let mut effects: Effects<i32> = Effects::new();
        effects.set_db(1);
        effects.push("other", ());
        effects.clear();
        assert!(effects.is_empty());
    }
}
