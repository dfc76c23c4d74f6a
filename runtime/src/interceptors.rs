//! Standard interceptors and handler combinators.
//!
//! These compose into the per-event interceptor slot of
//! [`Store::register_event_db_with`](crate::Store::register_event_db_with)
//! and friends, or wrap handlers directly ([`scoped`]).

use reflow_core::{Event, Interceptor};
use tracing::{debug, error};

/// Log the event on the way in and the produced effects on the way out.
#[must_use]
pub fn debug_events<Db: std::fmt::Debug + 'static>() -> Interceptor<Db> {
    Interceptor::new("debug")
        .before(|context| {
            debug!(event = ?context.coeffects.event(), "handling event");
            context
        })
        .after(|context| {
            debug!(
                event_id = %context.coeffects.event().id(),
                effects = ?context.effects,
                "handler produced effects"
            );
            context
        })
}

/// Check the `db` effect against `predicate` after the handler runs.
///
/// On failure the whole effects map is cleared, so the invalid state
/// never reaches the store, and an error is logged naming the event.
#[must_use]
pub fn validate_db<Db>(predicate: impl Fn(&Db) -> bool + Send + Sync + 'static) -> Interceptor<Db>
where
    Db: 'static,
{
    Interceptor::new("validate-db").after(move |mut context| {
        let invalid = context.effects.db().is_some_and(|db| !predicate(db));
        if invalid {
            error!(
                event_id = %context.coeffects.event().id(),
                "handler produced invalid state, dropping its effects"
            );
            context.effects.clear();
        }
        context
    })
}

/// Map the `db` effect after the handler runs. Events that produce no
/// `db` effect pass through untouched.
#[must_use]
pub fn enrich<Db>(f: impl Fn(Db) -> Db + Send + Sync + 'static) -> Interceptor<Db>
where
    Db: 'static,
{
    Interceptor::new("enrich").after(move |mut context| {
        if let Some(db) = context.effects.take_db() {
            context.effects.set_db(f(db));
        }
        context
    })
}

/// Focus a state-transforming handler onto a sub-value of the state.
///
/// `get` extracts the focused value, the handler transforms it, and `set`
/// writes it back into the full state. Everything outside the focus is
/// untouched by construction.
pub fn scoped<Db, S>(
    get: impl Fn(&Db) -> S + Send + Sync + 'static,
    set: impl Fn(Db, S) -> Db + Send + Sync + 'static,
    handler: impl Fn(S, &Event) -> S + Send + Sync + 'static,
) -> impl Fn(Db, &Event) -> Db + Send + Sync + 'static {
    move |db, event| {
        let focused = get(&db);
        let next = handler(focused, event);
        set(db, next)
    }
}
