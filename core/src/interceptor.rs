//! Two-phase interceptors and the chain runner.
//!
//! An interceptor wraps event handling the way middleware wraps a request:
//! its `before` hook runs on the way in and its `after` hook on the way
//! out, in reverse order (classic onion semantics). The runner walks the
//! context's queue, moving each interceptor onto the stack as it runs, and
//! [`switch_directions`] unwinds the stack back into the queue between the
//! two phases.

use std::borrow::Cow;
use std::sync::Arc;

use crate::context::Context;
use crate::error::StoreError;

/// A hook transforming a context, with failures surfacing as typed errors.
pub type Hook<Db> = Arc<dyn Fn(Context<Db>) -> Result<Context<Db>, StoreError> + Send + Sync>;

/// Which phase of the chain is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outer-to-inner phase, run before the event handler.
    Before,
    /// Inner-to-outer phase, run after the event handler.
    After,
}

/// A two-phase middleware unit composed into a chain around an event
/// handler.
///
/// Built with [`Interceptor::new`] plus at least one of
/// [`before`](Interceptor::before) / [`after`](Interceptor::after);
/// registration rejects hookless interceptors. The `id` is for
/// diagnostics, not uniqueness.
///
/// # Example
///
/// ```
/// use reflow_core::{Context, Interceptor};
///
/// let trim: Interceptor<String> = Interceptor::new("trim").after(|mut ctx: Context<String>| {
///     if let Some(db) = ctx.effects.take_db() {
///         ctx.effects.set_db(db.trim().to_owned());
///     }
///     ctx
/// });
/// assert_eq!(trim.id(), "trim");
/// ```
pub struct Interceptor<Db> {
    id: Cow<'static, str>,
    before: Option<Hook<Db>>,
    after: Option<Hook<Db>>,
}

impl<Db> Interceptor<Db> {
    /// Start building an interceptor with the given diagnostic id.
    #[must_use]
    pub fn new(id: impl Into<Cow<'static, str>>) -> Self {
        Self {
            id: id.into(),
            before: None,
            after: None,
        }
    }

    /// Set an infallible before-phase hook.
    #[must_use]
    pub fn before(self, f: impl Fn(Context<Db>) -> Context<Db> + Send + Sync + 'static) -> Self {
        self.try_before(move |ctx| Ok(f(ctx)))
    }

    /// Set an infallible after-phase hook.
    #[must_use]
    pub fn after(self, f: impl Fn(Context<Db>) -> Context<Db> + Send + Sync + 'static) -> Self {
        self.try_after(move |ctx| Ok(f(ctx)))
    }

    /// Set a fallible before-phase hook.
    #[must_use]
    pub fn try_before(
        mut self,
        f: impl Fn(Context<Db>) -> Result<Context<Db>, StoreError> + Send + Sync + 'static,
    ) -> Self {
        self.before = Some(Arc::new(f));
        self
    }

    /// Set a fallible after-phase hook.
    #[must_use]
    pub fn try_after(
        mut self,
        f: impl Fn(Context<Db>) -> Result<Context<Db>, StoreError> + Send + Sync + 'static,
    ) -> Self {
        self.after = Some(Arc::new(f));
        self
    }

    /// The diagnostic id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether at least one hook is set. Registration requires this.
    #[must_use]
    pub fn has_hooks(&self) -> bool {
        self.before.is_some() || self.after.is_some()
    }

    fn hook(&self, direction: Direction) -> Option<&Hook<Db>> {
        match direction {
            Direction::Before => self.before.as_ref(),
            Direction::After => self.after.as_ref(),
        }
    }
}

impl<Db> std::fmt::Debug for Interceptor<Db> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interceptor")
            .field("id", &self.id)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// Run one phase of the chain.
///
/// Pops interceptors off the context's queue one at a time, pushes them
/// onto the stack, and runs their hook for `direction` if they have one.
/// The queue and stack partition the full chain at every step.
///
/// # Errors
///
/// Propagates the first error returned by a hook; the context is consumed.
pub fn run_interceptor_queue<Db>(
    mut context: Context<Db>,
    direction: Direction,
) -> Result<Context<Db>, StoreError> {
    while let Some(interceptor) = context.pop_queued() {
        tracing::trace!(id = interceptor.id(), ?direction, "running interceptor");
        context.push_stacked(Arc::clone(&interceptor));
        if let Some(hook) = interceptor.hook(direction) {
            context = hook(context)?;
        }
    }
    Ok(context)
}

/// Swap the context's stack back into its queue, reversed.
///
/// Called between the before-phase and the after-phase so the after-phase
/// revisits the same interceptors in reverse invocation order.
#[must_use]
pub fn switch_directions<Db>(mut context: Context<Db>) -> Context<Db> {
    context.unwind_stack_into_queue();
    context
}

/// Run the full before → switch → after pipeline.
///
/// # Errors
///
/// Propagates the first error returned by any hook.
pub fn run_chain<Db>(context: Context<Db>) -> Result<Context<Db>, StoreError> {
    let context = run_interceptor_queue(context, Direction::Before)?;
    let context = switch_directions(context);
    run_interceptor_queue(context, Direction::After)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code can use unwrap

    use super::*;
    use crate::event::Event;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// An interceptor that records its id and phase into `log`.
    fn recording(id: &'static str, log: &Log) -> Arc<Interceptor<i32>> {
        let before_log = Arc::clone(log);
        let after_log = Arc::clone(log);
        Arc::new(
            Interceptor::new(id)
                .before(move |ctx| {
                    before_log.lock().unwrap().push(format!("{id}:before"));
                    ctx
                })
                .after(move |ctx| {
                    after_log.lock().unwrap().push(format!("{id}:after"));
                    ctx
                }),
        )
    }

    #[test]
    fn before_hooks_run_outer_to_inner_and_after_hooks_reversed() {
        let log: Log = Arc::default();
        let chain = vec![
            recording("i1", &log),
            recording("i2", &log),
            recording("i3", &log),
        ];

        run_chain(Context::new(&chain, Event::new("noop"))).unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "i1:before",
                "i2:before",
                "i3:before",
                "i3:after",
                "i2:after",
                "i1:after"
            ]
        );
    }

    #[test]
    fn queue_and_stack_partition_the_chain() {
        let log: Log = Arc::default();
        let chain = vec![recording("a", &log), recording("b", &log)];

        let context = Context::new(&chain, Event::new("noop"));
        assert_eq!(context.queued_len(), 2);
        assert_eq!(context.stacked_len(), 0);

        let context = run_interceptor_queue(context, Direction::Before).unwrap();
        assert_eq!(context.queued_len(), 0);
        assert_eq!(context.stacked_len(), 2);

        let context = switch_directions(context);
        assert_eq!(context.queued_len(), 2);
        assert_eq!(context.stacked_len(), 0);

        let context = run_interceptor_queue(context, Direction::After).unwrap();
        assert_eq!(context.queued_len(), 0);
        assert_eq!(context.stacked_len(), 2);
    }

    #[test]
    fn interceptors_without_a_hook_for_the_phase_are_skipped() {
        let log: Log = Arc::default();
        let before_log = Arc::clone(&log);
        let chain = vec![Arc::new(Interceptor::new("before-only").before(
            move |ctx: Context<i32>| {
                before_log.lock().unwrap().push("before-only".into());
                ctx
            },
        ))];

        run_chain(Context::new(&chain, Event::new("noop"))).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["before-only"]);
    }

    #[test]
    fn a_failing_hook_stops_the_chain() {
        let log: Log = Arc::default();
        let failing: Arc<Interceptor<i32>> =
            Arc::new(Interceptor::new("boom").try_before(|_ctx| {
                Err(StoreError::UnregisteredEffect {
                    event_id: "noop".into(),
                    effect_id: "missing".into(),
                })
            }));
        let chain = vec![failing, recording("later", &log)];

        let result = run_chain(Context::new(&chain, Event::new("noop")));
        assert!(matches!(
            result,
            Err(StoreError::UnregisteredEffect { .. })
        ));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn hooks_can_replace_coeffects_and_effects() {
        let chain = vec![Arc::new(Interceptor::new("double").before(
            |mut ctx: Context<i32>| {
                let db = ctx.coeffects.db().copied().unwrap_or_default();
                ctx.effects.set_db(db * 2);
                ctx
            },
        ))];

        let mut context = Context::new(&chain, Event::new("double"));
        context.coeffects.set_db(4);
        let context = run_chain(context).unwrap();
        assert_eq!(context.effects.db(), Some(&8));
    }

    #[test]
    fn new_interceptor_has_no_hooks() {
        let interceptor: Interceptor<i32> = Interceptor::new("empty");
        assert!(!interceptor.has_hooks());
        assert!(Interceptor::<i32>::new("x").before(|ctx| ctx).has_hooks());
    }
}
