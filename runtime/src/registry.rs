//! Handler registration tables.
//!
//! Four independent tables keyed by id string: event-handler interceptor
//! chains, effect handlers, coeffect injectors, and subscription
//! computers. The store wraps typed registration sugar around these; the
//! tables themselves store the erased forms.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use reflow_core::{Coeffects, DynValue, Interceptor, Query, StoreError};
use tracing::warn;

/// Failure modes of an erased effect handler.
///
/// `PayloadMismatch` is raised by the downcast wrapper; the store maps it
/// to a typed error carrying the event id, which the wrapper does not
/// know. Built-in effects that re-enter the store (`dispatch`) surface
/// their own store errors via `Store`.
pub(crate) enum EffectFailure {
    PayloadMismatch,
    Store(StoreError),
}

impl From<StoreError> for EffectFailure {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

/// Erased effect handler: receives the payload slot of one effect entry.
pub(crate) type EffectFn = Arc<dyn Fn(DynValue) -> Result<(), EffectFailure> + Send + Sync>;

/// Coeffect injector: enriches the coeffects before the handler runs.
pub(crate) type CoeffectFn<Db> = Arc<dyn Fn(&mut Coeffects<Db>) + Send + Sync>;

/// Subscription computer plus the `TypeId` of the value it produces
/// (checked against the subscriber's requested type at subscribe time)
/// and an equality test over erased values, used by the cache to skip
/// notifications when a recompute yields an equal value.
pub(crate) struct SubHandler<Db> {
    pub(crate) compute: Arc<dyn Fn(&Db, &Query) -> DynValue + Send + Sync>,
    pub(crate) value_type: TypeId,
    pub(crate) values_equal: Arc<dyn Fn(&DynValue, &DynValue) -> bool + Send + Sync>,
}

impl<Db> Clone for SubHandler<Db> {
    fn clone(&self) -> Self {
        Self {
            compute: Arc::clone(&self.compute),
            value_type: self.value_type,
            values_equal: Arc::clone(&self.values_equal),
        }
    }
}

/// All handler tables of one store.
pub(crate) struct Registry<Db> {
    events: HashMap<String, Arc<[Arc<Interceptor<Db>>]>>,
    effects: HashMap<String, EffectFn>,
    coeffects: HashMap<String, CoeffectFn<Db>>,
    subscriptions: HashMap<String, SubHandler<Db>>,
}

impl<Db> Registry<Db> {
    pub(crate) fn new() -> Self {
        Self {
            events: HashMap::new(),
            effects: HashMap::new(),
            coeffects: HashMap::new(),
            subscriptions: HashMap::new(),
        }
    }

    pub(crate) fn register_event(&mut self, id: &str, chain: Arc<[Arc<Interceptor<Db>>]>) {
        if self.events.insert(id.to_owned(), chain).is_some() {
            warn!(event_id = %id, "overwriting event handler");
        }
    }

    pub(crate) fn event_chain(&self, id: &str) -> Option<Arc<[Arc<Interceptor<Db>>]>> {
        self.events.get(id).cloned()
    }

    pub(crate) fn register_effect(&mut self, id: &str, handler: EffectFn) {
        if self.effects.insert(id.to_owned(), handler).is_some() {
            warn!(effect_id = %id, "overwriting effect handler");
        }
    }

    pub(crate) fn effect(&self, id: &str) -> Option<EffectFn> {
        self.effects.get(id).cloned()
    }

    pub(crate) fn register_coeffect(&mut self, id: &str, handler: CoeffectFn<Db>) {
        if self.coeffects.insert(id.to_owned(), handler).is_some() {
            warn!(coeffect_id = %id, "overwriting coeffect handler");
        }
    }

    pub(crate) fn coeffect(&self, id: &str) -> Option<CoeffectFn<Db>> {
        self.coeffects.get(id).cloned()
    }

    pub(crate) fn register_sub(&mut self, id: &str, handler: SubHandler<Db>) {
        if self.subscriptions.insert(id.to_owned(), handler).is_some() {
            warn!(query_id = %id, "overwriting subscription handler");
        }
    }

    pub(crate) fn sub(&self, id: &str) -> Option<SubHandler<Db>> {
        self.subscriptions.get(id).cloned()
    }
}
