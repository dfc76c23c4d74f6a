//! End-to-end dispatch and queue behavior.

#![allow(clippy::unwrap_used)] // Test code can use unwrap

use std::sync::Arc;

use reflow_runtime::{Effects, Event, Store, StoreConfig, StoreError};
use reflow_testing::{ManualScheduler, Recorder, init_tracing};

fn manual_store(initial: i64) -> (Store<i64>, Arc<ManualScheduler>) {
    let scheduler = Arc::new(ManualScheduler::new());
    let store = Store::with_config(
        initial,
        StoreConfig::new().shared_scheduler(scheduler.clone()),
    );
    (store, scheduler)
}

#[test]
fn events_process_in_dispatch_order() {
    init_tracing();
    let (store, scheduler) = manual_store(0);
    store.register_event_db("a", |db, _| db);
    store.register_event_db("b", |db, _| db);
    store.register_event_db("c", |db, _| db);

    let seen = Recorder::new();
    let sink = seen.clone();
    store.add_post_event_callback("order", move |event| sink.record(event.id().to_owned()));

    store.dispatch("a").unwrap();
    store.dispatch("b").unwrap();
    store.dispatch("c").unwrap();
    assert!(seen.is_empty());

    scheduler.run_next().unwrap();
    assert_eq!(seen.values(), vec!["a", "b", "c"]);
}

#[test]
fn sync_dispatch_cuts_the_line() {
    let (store, scheduler) = manual_store(0);
    store.register_event_db("queued", |db, _| db);
    store.register_event_db("urgent", |db, _| db);

    let seen = Recorder::new();
    let sink = seen.clone();
    store.add_post_event_callback("order", move |event| sink.record(event.id().to_owned()));

    store.dispatch("queued").unwrap();
    store.dispatch("queued").unwrap();
    store.dispatch("queued").unwrap();
    store.dispatch_sync("urgent").unwrap();

    scheduler.run_all().unwrap();
    assert_eq!(seen.values(), vec!["urgent", "queued", "queued", "queued"]);
}

#[test]
fn events_dispatched_by_a_handler_wait_for_the_next_batch() {
    let (store, scheduler) = manual_store(3);
    let runs = Recorder::new();
    let counter = runs.clone();
    store.register_event_fx("countdown", move |coeffects| {
        counter.record(());
        let remaining = *coeffects.db().unwrap();
        let mut effects = Effects::new();
        if remaining > 0 {
            effects.set_db(remaining - 1);
            effects.push("dispatch", Event::new("countdown"));
        }
        effects
    });

    store.dispatch("countdown").unwrap();
    scheduler.run_next().unwrap();
    // One flush, one handler run; the re-dispatch is buffered.
    assert_eq!(runs.len(), 1);
    assert_eq!(store.state(), 2);
    assert_eq!(store.pending_events(), 1);

    // Recursion depth 3 takes three more flushes to exhaust.
    let ran = scheduler.run_all().unwrap();
    assert_eq!(ran, 3);
    assert_eq!(runs.len(), 4);
    assert_eq!(store.state(), 0);
}

#[test]
fn event_db_and_event_fx_handlers_are_equivalent() {
    let (store, scheduler) = manual_store(3);
    store.register_event_db("double-db", |db, _| db * 2);
    store.dispatch("double-db").unwrap();
    scheduler.run_all().unwrap();
    let via_db = store.state();

    let (store, scheduler) = manual_store(3);
    store.register_event_fx("double-fx", |coeffects| {
        let mut effects = Effects::new();
        effects.set_db(coeffects.db().unwrap() * 2);
        effects
    });
    store.dispatch("double-fx").unwrap();
    scheduler.run_all().unwrap();

    assert_eq!(via_db, store.state());
    assert_eq!(store.state(), 6);
}

#[test]
fn a_failing_handler_purges_the_rest_of_the_batch() {
    let (store, scheduler) = manual_store(0);
    store.register_event_db("inc", |db, _| db + 1);
    store.register_event_fx("boom", |_| {
        let mut effects = Effects::new();
        effects.push("unregistered-effect", ());
        effects
    });

    store.dispatch("inc").unwrap();
    store.dispatch("boom").unwrap();
    store.dispatch("inc").unwrap();

    let error = scheduler.run_next().unwrap_err();
    assert!(matches!(
        error,
        reflow_testing::PumpError::Store(StoreError::UnregisteredEffect { .. })
    ));

    // The first event landed, the rest of the batch was discarded.
    assert_eq!(store.state(), 1);
    assert_eq!(store.pending_events(), 0);

    // The queue recovered: later dispatches process normally.
    store.dispatch("inc").unwrap();
    scheduler.run_all().unwrap();
    assert_eq!(store.state(), 2);
}

#[test]
fn double_event_end_to_end() {
    let (store, scheduler) = manual_store(1);
    store.register_event_db("double", |db, _| db * 2);

    store.dispatch("double").unwrap();
    assert_eq!(store.state(), 1);
    scheduler.run_next().unwrap();
    assert_eq!(store.state(), 2);

    store.dispatch("double").unwrap();
    scheduler.run_next().unwrap();
    assert_eq!(store.state(), 4);
}

#[test]
fn pause_buffers_and_resume_drains() {
    let (store, scheduler) = manual_store(0);
    store.register_event_db("inc", |db, _| db + 1);

    store.pause();
    store.dispatch("inc").unwrap();
    store.dispatch("inc").unwrap();
    assert_eq!(scheduler.pending(), 0);
    assert_eq!(store.pending_events(), 2);

    store.resume();
    assert_eq!(scheduler.pending(), 1);
    scheduler.run_all().unwrap();
    assert_eq!(store.state(), 2);
}

#[test]
fn purge_discards_buffered_events() {
    let (store, scheduler) = manual_store(0);
    store.register_event_db("inc", |db, _| db + 1);

    store.pause();
    store.dispatch("inc").unwrap();
    store.dispatch("inc").unwrap();
    store.purge();
    store.resume();

    scheduler.run_all().unwrap();
    assert_eq!(store.state(), 0);
}

#[test]
fn dispatch_n_effect_queues_events_in_order() {
    let (store, scheduler) = manual_store(0);
    store.register_event_db("add-1", |db, _| db + 1);
    store.register_event_db("mul-10", |db, _| db * 10);
    store.register_event_fx("kick-off", |_| {
        let mut effects = Effects::new();
        effects.push(
            "dispatch-n",
            vec![Event::new("add-1"), Event::new("mul-10"), Event::new("add-1")],
        );
        effects
    });

    store.dispatch("kick-off").unwrap();
    scheduler.run_all().unwrap();
    assert_eq!(store.state(), 11);
}

#[test]
fn event_payloads_reach_the_handler() {
    let (store, scheduler) = manual_store(0);
    store.register_event_db("set", |db, event| {
        event.payload::<i64>().copied().unwrap_or(db)
    });

    store.dispatch(Event::with_payload("set", 42_i64)).unwrap();
    scheduler.run_all().unwrap();
    assert_eq!(store.state(), 42);
}

#[tokio::test]
async fn tokio_scheduler_drains_in_the_background() {
    let store = Store::new(1_i64);
    store.register_event_db("double", |db, _| db * 2);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    store.add_post_event_callback("notify", move |event| {
        let _ = tx.send(event.id().to_owned());
    });

    store.dispatch("double").unwrap();
    assert_eq!(rx.recv().await.as_deref(), Some("double"));
    assert_eq!(store.state(), 2);
}

#[test]
fn named_effects_and_callbacks_run_before_subscription_watchers() {
    let (store, scheduler) = manual_store(0);
    let seen = Recorder::new();

    let effect_sink = seen.clone();
    store.register_effect::<String>("log", move |_| effect_sink.record("effect"));
    store.register_event_fx("bump", |coeffects| {
        let mut effects = Effects::new();
        effects.set_db(coeffects.db().copied().unwrap_or_default() + 1);
        effects.push("log", "bumped".to_owned());
        effects
    });
    store.register_subscription("count", |db: &i64, _| *db);

    let callback_sink = seen.clone();
    store.add_post_event_callback("order", move |_| callback_sink.record("callback"));

    let count = store.subscribe::<i64>("count").unwrap();
    let watcher_sink = seen.clone();
    let _watch = count.watch(move |_, _| watcher_sink.record("watcher"));

    store.dispatch("bump").unwrap();
    scheduler.run_all().unwrap();
    assert_eq!(seen.values(), vec!["effect", "callback", "watcher"]);
}
