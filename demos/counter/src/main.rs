//! Counter example binary
//!
//! Demonstrates the reflow event-processing architecture with a simple
//! counter.

use counter::{CounterApp, wire};
use reflow_core::Event;
use reflow_runtime::Store;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), reflow_runtime::StoreError> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "counter=debug,reflow_runtime=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Counter Example: reflow architecture ===\n");

    let store = Store::new(CounterApp::default());
    wire(&store);
    info!("counter store wired");

    // Watch the derived parity; it only reports actual flips.
    let parity = store.subscribe::<&str>("parity")?;
    let _guard = parity.watch(|prev, next| {
        println!("    parity changed: {prev:?} -> {next}");
    });

    // The tokio scheduler drains in the background; use a post-event
    // callback to await each processed event.
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    store.add_post_event_callback("main", move |event| {
        let _ = tx.send(event.id().to_owned());
    });

    println!("Initial count: {}", store.state().count);

    println!("\n>>> Dispatching: increment (payload 5)");
    store.dispatch(Event::with_payload("increment", 5_i64))?;
    rx.recv().await;
    println!("Count: {}", store.state().count);

    println!("\n>>> Dispatching: increment");
    store.dispatch("increment")?;
    rx.recv().await;
    println!("Count: {}", store.state().count);

    println!("\n>>> Dispatching: decrement");
    store.dispatch("decrement")?;
    rx.recv().await;
    println!("Count: {}", store.state().count);

    println!("\n>>> Dispatching synchronously: reset");
    store.dispatch_sync("reset")?;
    println!("Count: {}", store.state().count);

    println!("\n=== Done ===");
    Ok(())
}
