//! The store: state, queue, handlers, and subscriptions in one place.
//!
//! A [`Store`] owns the application state atom, the event queue, the
//! handler registry, and the subscription cache. Dispatched events run
//! through an interceptor chain assembled at registration time:
//!
//! ```text
//! inject-db -> run-effects -> global interceptors -> user interceptors -> handler
//! ```
//!
//! The before phase walks that chain left to right (injecting the current
//! state as the `db` coeffect on the way in); the after phase walks it
//! right to left, so `run-effects` applies the handler's effects last.
//! When the `db` effect differs from the snapshot taken at injection,
//! every cached subscription is recomputed and changed ones notify.

use std::any::TypeId;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use metrics::{counter, gauge};
use reflow_core::{
    Atom, Coeffects, Context, Effects, Event, Interceptor, Query, StoreError, run_chain,
};
use tracing::{debug, trace, warn};

use crate::registry::{EffectFailure, EffectFn, Registry, SubHandler};
use crate::scheduler::{Tick, TickScheduler, TokioScheduler};
use crate::subscription::{RetainFn, Subscription, SubscriptionCache};

type PostEventFn = Arc<dyn Fn(&Event) + Send + Sync>;

/// Construction options for a [`Store`].
///
/// The defaults are the production setup: a [`TokioScheduler`] and no
/// global interceptors.
pub struct StoreConfig<Db> {
    scheduler: Arc<dyn TickScheduler>,
    interceptors: Vec<Arc<Interceptor<Db>>>,
}

impl<Db> StoreConfig<Db> {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scheduler: Arc::new(TokioScheduler),
            interceptors: Vec::new(),
        }
    }

    /// Replace the drain-tick scheduler.
    #[must_use]
    pub fn scheduler(mut self, scheduler: impl TickScheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    /// Replace the scheduler with an already-shared one.
    #[must_use]
    pub fn shared_scheduler(mut self, scheduler: Arc<dyn TickScheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Append a global interceptor, run for every registered event ahead
    /// of the per-event interceptors.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Interceptor<Db>) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }
}

impl<Db> Default for StoreConfig<Db> {
    fn default() -> Self {
        Self::new()
    }
}

struct StoreInner<Db> {
    state: Atom<Db>,
    queue: Mutex<crate::event_queue::EventQueue>,
    registry: Mutex<Registry<Db>>,
    cache: Mutex<SubscriptionCache<Db>>,
    callbacks: Mutex<Vec<(String, PostEventFn)>>,
    scheduler: Arc<dyn TickScheduler>,
    globals: Vec<Arc<Interceptor<Db>>>,
    inject_db: Arc<Interceptor<Db>>,
    run_effects: Arc<Interceptor<Db>>,
}

/// A handle onto one store. Cheap to clone; all clones share state.
pub struct Store<Db> {
    inner: Arc<StoreInner<Db>>,
}

impl<Db> Clone for Store<Db> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Db> std::fmt::Debug for Store<Db> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[allow(clippy::cast_precision_loss)] // queue depths are far below 2^52
fn as_gauge(value: usize) -> f64 {
    value as f64
}

impl<Db> Store<Db>
where
    Db: Clone + PartialEq + Send + Sync + 'static,
{
    /// Create a store seeded with `initial` state, using the default
    /// configuration (tokio scheduler, no global interceptors).
    #[must_use]
    pub fn new(initial: Db) -> Self {
        Self::with_config(initial, StoreConfig::new())
    }

    /// Create a store with explicit configuration.
    #[must_use]
    pub fn with_config(initial: Db, config: StoreConfig<Db>) -> Self {
        let StoreConfig {
            scheduler,
            interceptors,
        } = config;

        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner<Db>>| {
            let inject_db = {
                let weak = weak.clone();
                Arc::new(Interceptor::new("inject-db").before(move |mut context| {
                    if let Some(db) = weak.upgrade().and_then(|inner| inner.state.deref()) {
                        context.coeffects.set_db(db);
                    }
                    context
                }))
            };

            let run_effects = {
                let weak = weak.clone();
                Arc::new(
                    Interceptor::new("run-effects").try_after(move |mut context| {
                        let Some(inner) = weak.upgrade() else {
                            return Ok(context);
                        };
                        inner.apply_effects(&mut context)?;
                        Ok(context)
                    }),
                )
            };

            let mut registry = Registry::new();
            registry.register_effect("dispatch", Self::dispatch_effect(weak.clone()));
            registry.register_effect("dispatch-n", Self::dispatch_n_effect(weak.clone()));

            StoreInner {
                state: Atom::with_value(initial),
                queue: Mutex::new(crate::event_queue::EventQueue::new()),
                registry: Mutex::new(registry),
                cache: Mutex::new(SubscriptionCache::new()),
                callbacks: Mutex::new(Vec::new()),
                scheduler,
                globals: interceptors,
                inject_db,
                run_effects,
            }
        });

        Self { inner }
    }

    /// The built-in `dispatch` effect: enqueue one follow-up event. It
    /// lands in the buffer like any other dispatch, so it runs in a later
    /// batch, never the current one.
    fn dispatch_effect(weak: Weak<StoreInner<Db>>) -> EffectFn {
        Arc::new(move |payload| {
            let event = payload
                .downcast_ref::<Event>()
                .ok_or(EffectFailure::PayloadMismatch)?
                .clone();
            if let Some(inner) = weak.upgrade() {
                StoreInner::enqueue(&inner, event)?;
            }
            Ok(())
        })
    }

    /// The built-in `dispatch-n` effect: enqueue a sequence of follow-up
    /// events in order.
    fn dispatch_n_effect(weak: Weak<StoreInner<Db>>) -> EffectFn {
        Arc::new(move |payload| {
            let events = payload
                .downcast_ref::<Vec<Event>>()
                .ok_or(EffectFailure::PayloadMismatch)?
                .clone();
            if let Some(inner) = weak.upgrade() {
                for event in events {
                    StoreInner::enqueue(&inner, event)?;
                }
            }
            Ok(())
        })
    }

    /// Current application state.
    #[must_use]
    // The state atom is seeded at construction and nothing disposes it.
    #[allow(clippy::expect_used)]
    pub fn state(&self) -> Db {
        self.inner.state.deref().expect("state atom is seeded")
    }

    /// Register a state-transforming handler for `id`.
    ///
    /// The handler receives the current state and the event and returns
    /// the next state. Shorthand for an effects handler that only sets
    /// the `db` effect.
    pub fn register_event_db(
        &self,
        id: &str,
        handler: impl Fn(Db, &Event) -> Db + Send + Sync + 'static,
    ) {
        // No user interceptors, so validation cannot fail.
        let _ = self.register_event_db_with(id, Vec::new(), handler);
    }

    /// Register a state-transforming handler with per-event interceptors,
    /// run between the global interceptors and the handler.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInterceptor`] when an interceptor in
    /// `interceptors` carries neither a before nor an after hook.
    pub fn register_event_db_with(
        &self,
        id: &str,
        interceptors: Vec<Arc<Interceptor<Db>>>,
        handler: impl Fn(Db, &Event) -> Db + Send + Sync + 'static,
    ) -> Result<(), StoreError> {
        let adapter = Interceptor::new(format!("db-handler[{id}]")).try_before(move |mut context| {
            let db = context.coeffects.db().cloned().ok_or_else(|| {
                StoreError::MissingDbCoeffect {
                    event_id: context.coeffects.event().id().to_owned(),
                }
            })?;
            let event = context.coeffects.event().clone();
            context.effects.set_db(handler(db, &event));
            Ok(context)
        });
        self.register_event(id, interceptors, adapter)
    }

    /// Register an effects-returning handler for `id`.
    ///
    /// The handler receives the coeffects (event, current state, anything
    /// injected with [`Store::inject_coeffect`]) and returns the effects
    /// to apply: the `db` slot plus named effect entries, applied in
    /// insertion order after the state change.
    pub fn register_event_fx(
        &self,
        id: &str,
        handler: impl Fn(&Coeffects<Db>) -> Effects<Db> + Send + Sync + 'static,
    ) {
        let _ = self.register_event_fx_with(id, Vec::new(), handler);
    }

    /// Register an effects-returning handler with per-event interceptors.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInterceptor`] when an interceptor in
    /// `interceptors` carries neither a before nor an after hook.
    pub fn register_event_fx_with(
        &self,
        id: &str,
        interceptors: Vec<Arc<Interceptor<Db>>>,
        handler: impl Fn(&Coeffects<Db>) -> Effects<Db> + Send + Sync + 'static,
    ) -> Result<(), StoreError> {
        let adapter = Interceptor::new(format!("fx-handler[{id}]")).before(move |mut context| {
            context.effects = handler(&context.coeffects);
            context
        });
        self.register_event(id, interceptors, adapter)
    }

    fn register_event(
        &self,
        id: &str,
        interceptors: Vec<Arc<Interceptor<Db>>>,
        adapter: Interceptor<Db>,
    ) -> Result<(), StoreError> {
        for (index, interceptor) in interceptors.iter().enumerate() {
            if !interceptor.has_hooks() {
                return Err(StoreError::InvalidInterceptor {
                    event_id: id.to_owned(),
                    index,
                    interceptor_id: interceptor.id().to_owned(),
                });
            }
        }

        let mut chain =
            Vec::with_capacity(3 + self.inner.globals.len() + interceptors.len());
        chain.push(Arc::clone(&self.inner.inject_db));
        chain.push(Arc::clone(&self.inner.run_effects));
        chain.extend(self.inner.globals.iter().cloned());
        chain.extend(interceptors);
        chain.push(Arc::new(adapter));

        debug!(event_id = %id, chain_len = chain.len(), "registering event handler");
        self.inner.registry_lock().register_event(id, Arc::from(chain));
        Ok(())
    }

    /// Register an effect handler for `id` with a typed payload.
    ///
    /// The handler runs synchronously during effect application; any
    /// asynchronous work it starts must re-enter the store through
    /// `dispatch`.
    pub fn register_effect<P: Send + Sync + 'static>(
        &self,
        id: &str,
        handler: impl Fn(&P) + Send + Sync + 'static,
    ) {
        let erased: EffectFn = Arc::new(move |payload| {
            let payload = payload
                .downcast_ref::<P>()
                .ok_or(EffectFailure::PayloadMismatch)?;
            handler(payload);
            Ok(())
        });
        debug!(effect_id = %id, "registering effect handler");
        self.inner.registry_lock().register_effect(id, erased);
    }

    /// Register a coeffect provider for `id`, injected into a chain with
    /// [`Store::inject_coeffect`].
    pub fn register_coeffect(
        &self,
        id: &str,
        handler: impl Fn(&mut Coeffects<Db>) + Send + Sync + 'static,
    ) {
        debug!(coeffect_id = %id, "registering coeffect provider");
        self.inner
            .registry_lock()
            .register_coeffect(id, Arc::new(handler));
    }

    /// Build an interceptor that runs the registered coeffect provider
    /// `id` in its before phase. The provider is looked up when the chain
    /// runs, so registration order does not matter; a missing provider is
    /// a batch-purging error at that point.
    #[must_use]
    pub fn inject_coeffect(&self, id: &str) -> Arc<Interceptor<Db>> {
        let weak = Arc::downgrade(&self.inner);
        let coeffect_id = id.to_owned();
        Arc::new(
            Interceptor::new(format!("coeffect[{id}]")).try_before(move |mut context| {
                let Some(inner) = weak.upgrade() else {
                    return Ok(context);
                };
                let provider = inner.registry_lock().coeffect(&coeffect_id).ok_or_else(|| {
                    StoreError::UnregisteredCoeffect {
                        id: coeffect_id.clone(),
                    }
                })?;
                provider(&mut context.coeffects);
                Ok(context)
            }),
        )
    }

    /// Register a subscription computing `V` from the state and query.
    ///
    /// Subscribers of equal queries share one cached value; it is
    /// recomputed after every state change and watchers fire only when
    /// the recomputed value differs.
    pub fn register_subscription<V>(
        &self,
        id: &str,
        compute: impl Fn(&Db, &Query) -> V + Send + Sync + 'static,
    ) where
        V: Clone + PartialEq + Send + Sync + 'static,
    {
        let handler = SubHandler {
            compute: Arc::new(move |db, query| Arc::new(compute(db, query))),
            value_type: TypeId::of::<V>(),
            values_equal: Arc::new(|a, b| a.downcast_ref::<V>() == b.downcast_ref::<V>()),
        };
        debug!(query_id = %id, "registering subscription");
        self.inner.registry_lock().register_sub(id, handler);
    }

    /// Dispatch an event for batched asynchronous processing.
    ///
    /// The event is validated eagerly, buffered in FIFO order, and
    /// processed on a later drain tick. Events dispatched from inside a
    /// handler land in the next batch.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnregisteredEvent`] when no handler is
    /// registered for the event's id.
    pub fn dispatch(&self, event: impl Into<Event>) -> Result<(), StoreError> {
        StoreInner::enqueue(&self.inner, event.into())
    }

    /// Process an event immediately, ahead of anything buffered in the
    /// queue. Used for bootstrapping initial state and for replay, where
    /// ordering relative to the caller matters.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnregisteredEvent`] for an unknown event id,
    /// or whatever error the chain produced. Unlike the batched path, a
    /// failure here does not purge the queue.
    pub fn dispatch_sync(&self, event: impl Into<Event>) -> Result<(), StoreError> {
        let event = event.into();
        debug!(event_id = %event.id(), "dispatch_sync");
        StoreInner::process_event(&self.inner, &event)?;
        counter!("store.events.processed").increment(1);
        Ok(())
    }

    /// Subscribe to the registered query, sharing the cache entry with
    /// any other subscriber of an equal query.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnregisteredSubscription`] for an unknown
    /// query id, or [`StoreError::SubscriptionValueType`] when `V` is not
    /// the type the subscription was registered with.
    pub fn subscribe<V>(&self, query: impl Into<Query>) -> Result<Subscription<V>, StoreError>
    where
        V: Clone + PartialEq + Send + Sync + 'static,
    {
        let query = query.into();
        let handler = self.lookup_sub::<V>(query.id())?;

        let db = self.state();
        let (key, cell, active) = {
            let mut cache = self.inner.cache_lock();
            let (key, cell) = cache.subscribe(query, &handler, &db);
            (key, cell, cache.len())
        };
        gauge!("store.subscriptions.active").set(as_gauge(active));

        let weak = Arc::downgrade(&self.inner);
        let retain: RetainFn = Arc::new(move |key, delta| {
            if let Some(inner) = weak.upgrade() {
                let active = {
                    let mut cache = inner.cache_lock();
                    cache.retain(key, delta);
                    cache.len()
                };
                gauge!("store.subscriptions.active").set(as_gauge(active));
            }
        });
        Ok(Subscription::new(cell, key, retain))
    }

    /// Compute the registered query once, without touching the cache.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`Store::subscribe`].
    pub fn query<V>(&self, query: impl Into<Query>) -> Result<V, StoreError>
    where
        V: Clone + PartialEq + Send + Sync + 'static,
    {
        let query = query.into();
        let handler = self.lookup_sub::<V>(query.id())?;
        let db = self.state();
        let value = (handler.compute)(&db, &query);
        value
            .downcast_ref::<V>()
            .cloned()
            .ok_or_else(|| StoreError::SubscriptionValueType {
                id: query.id().to_owned(),
            })
    }

    fn lookup_sub<V: 'static>(&self, id: &str) -> Result<SubHandler<Db>, StoreError> {
        let handler = self.inner.registry_lock().sub(id).ok_or_else(|| {
            StoreError::UnregisteredSubscription { id: id.to_owned() }
        })?;
        if handler.value_type != TypeId::of::<V>() {
            return Err(StoreError::SubscriptionValueType { id: id.to_owned() });
        }
        Ok(handler)
    }

    /// Register a callback invoked after every processed event, in
    /// registration order. Used by devtools-style consumers to observe
    /// the event stream without participating in it.
    pub fn add_post_event_callback(
        &self,
        id: &str,
        callback: impl Fn(&Event) + Send + Sync + 'static,
    ) {
        self.inner
            .callbacks_lock()
            .push((id.to_owned(), Arc::new(callback)));
    }

    /// Remove a callback added with [`Store::add_post_event_callback`].
    /// Returns `false` when no callback is registered under `id`.
    pub fn remove_post_event_callback(&self, id: &str) -> bool {
        let mut callbacks = self.inner.callbacks_lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| existing != id);
        before != callbacks.len()
    }

    /// Suspend queue draining. Dispatch keeps buffering.
    pub fn pause(&self) {
        self.inner.queue_lock().pause();
    }

    /// Resume queue draining, scheduling a tick if events buffered while
    /// paused.
    pub fn resume(&self) {
        let schedule = self.inner.queue_lock().resume();
        if schedule {
            StoreInner::schedule_tick(&self.inner);
        }
    }

    /// Drop every buffered event without processing it.
    pub fn purge(&self) {
        self.inner.queue_lock().purge();
        gauge!("event_queue.size").set(0.0);
    }

    /// Number of events currently buffered.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.inner.queue_lock().size()
    }
}

impl<Db> StoreInner<Db>
where
    Db: Clone + PartialEq + Send + Sync + 'static,
{
    fn enqueue(inner: &Arc<Self>, event: Event) -> Result<(), StoreError> {
        if inner.registry_lock().event_chain(event.id()).is_none() {
            return Err(StoreError::UnregisteredEvent {
                id: event.id().to_owned(),
            });
        }

        debug!(event_id = %event.id(), "dispatch");
        let (schedule, size) = {
            let mut queue = inner.queue_lock();
            let schedule = queue.push(event);
            (schedule, queue.size())
        };
        gauge!("event_queue.size").set(as_gauge(size));
        if schedule {
            Self::schedule_tick(inner);
        }
        Ok(())
    }

    fn schedule_tick(inner: &Arc<Self>) {
        let weak = Arc::downgrade(inner);
        inner.scheduler.schedule(Tick::new(move || match weak.upgrade() {
            Some(inner) => Self::run_queue_tick(&inner),
            None => Ok(()),
        }));
    }

    /// One drain pass: processes exactly the events buffered when the
    /// pass begins. A handler error purges the rest of the batch.
    fn run_queue_tick(inner: &Arc<Self>) -> Result<(), StoreError> {
        let Some(batch) = inner.queue_lock().begin_run() else {
            return Ok(());
        };
        trace!(batch, "draining event batch");

        for _ in 0..batch {
            let Some(event) = inner.queue_lock().pop_next() else {
                break;
            };
            if let Err(cause) = Self::process_event(inner, &event) {
                inner.queue_lock().fail();
                gauge!("event_queue.size").set(0.0);
                counter!("store.batch.purged").increment(1);
                warn!(event_id = %event.id(), %cause, "handler failed, purging event batch");
                return Err(cause);
            }
            counter!("store.events.processed").increment(1);
        }

        let (schedule, size) = {
            let mut queue = inner.queue_lock();
            (queue.finish_run(), queue.size())
        };
        gauge!("event_queue.size").set(as_gauge(size));
        if schedule {
            Self::schedule_tick(inner);
        }
        Ok(())
    }

    /// Run one event through its interceptor chain, invoke the
    /// post-event callbacks, and last of all notify subscriptions.
    ///
    /// Subscription refresh waits until every effect has been applied
    /// and the callbacks have run, and fires only when the batch of
    /// effects moved the state away from the db snapshot taken at the
    /// start of the chain.
    fn process_event(inner: &Arc<Self>, event: &Event) -> Result<(), StoreError> {
        let chain = inner.registry_lock().event_chain(event.id()).ok_or_else(|| {
            StoreError::UnregisteredEvent {
                id: event.id().to_owned(),
            }
        })?;

        let context = Context::new(&chain, event.clone());
        let context = run_chain(context)?;

        let callbacks: Vec<PostEventFn> = inner
            .callbacks_lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback(event);
        }

        let current = inner.state.deref();
        if context.coeffects.db() != current.as_ref() {
            if let Some(db) = current {
                let plan = inner.cache_lock().refresh_plan();
                for item in &plan {
                    item.run(&db);
                }
            }
        }
        Ok(())
    }

    /// After-phase of the built-in `run-effects` interceptor: apply the
    /// `db` effect by resetting the state atom, then the named effects in
    /// insertion order. Notifying subscriptions of the new state is left
    /// to the end of the processing routine.
    fn apply_effects(self: &Arc<Self>, context: &mut Context<Db>) -> Result<(), StoreError> {
        if let Some(next_db) = context.effects.take_db() {
            self.state.reset(next_db);
        }

        let event_id = context.coeffects.event().id().to_owned();
        for (effect_id, payload) in context.effects.drain_extras() {
            let handler = self.registry_lock().effect(&effect_id).ok_or_else(|| {
                StoreError::UnregisteredEffect {
                    event_id: event_id.clone(),
                    effect_id: effect_id.clone(),
                }
            })?;
            trace!(%event_id, %effect_id, "running effect");
            handler(payload).map_err(|failure| match failure {
                EffectFailure::PayloadMismatch => StoreError::EffectPayloadType {
                    event_id: event_id.clone(),
                    effect_id: effect_id.clone(),
                },
                EffectFailure::Store(cause) => cause,
            })?;
        }
        Ok(())
    }
}

// Poisoning only matters across panics, which the lint profile forbids in
// this crate; recover the guard rather than poison-propagate.
impl<Db> StoreInner<Db> {
    fn queue_lock(&self) -> MutexGuard<'_, crate::event_queue::EventQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_lock(&self) -> MutexGuard<'_, Registry<Db>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_lock(&self) -> MutexGuard<'_, SubscriptionCache<Db>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn callbacks_lock(&self) -> MutexGuard<'_, Vec<(String, PostEventFn)>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
