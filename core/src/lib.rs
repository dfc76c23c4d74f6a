//! # Reflow Core
//!
//! Core types for the reflow state store.
//!
//! This crate provides the leaf primitives that the store runtime is built
//! from. None of them schedule work or perform I/O on their own.
//!
//! ## Core Concepts
//!
//! - **Atom**: a mutable, watchable reference cell
//! - **Event**: a named input dispatched to the store (`id` plus optional payload)
//! - **Query**: a named request for a derived view (`id` plus optional parameters)
//! - **Context**: the unit of interceptor-chain execution (coeffects in, effects out)
//! - **Interceptor**: a two-phase (before/after) middleware unit composed
//!   into a chain around an event handler
//!
//! ## Architecture Principles
//!
//! - Unidirectional data flow: events in, state out, derived views on top
//! - Contexts move by value through interceptor hooks, so the compiler
//!   enforces the copy-on-write discipline between steps
//! - Explicit `Result` returns instead of exceptions for control flow
//!
//! ## Example
//!
//! ```
//! use reflow_core::{Context, Event, Interceptor, run_chain};
//!
//! let chain = vec![std::sync::Arc::new(
//!     Interceptor::new("double").before(|mut ctx: Context<i64>| {
//!         if let Some(db) = ctx.coeffects.db().copied() {
//!             ctx.effects.set_db(db * 2);
//!         }
//!         ctx
//!     }),
//! )];
//!
//! let mut context = Context::new(&chain, Event::new("double"));
//! context.coeffects.set_db(21);
//! let context = run_chain(context).unwrap();
//! assert_eq!(context.effects.db(), Some(&42));
//! ```

/// Mutable, watchable reference cells.
pub mod atom;

/// Interceptor-chain execution contexts.
pub mod context;

/// Error types shared across the store.
pub mod error;

/// Events dispatched to the store.
pub mod event;

/// Two-phase interceptors and the chain runner.
pub mod interceptor;

/// Queries for derived views.
pub mod query;

pub use atom::{Atom, Unwatch};
pub use context::{Coeffects, Context, Effects};
pub use error::StoreError;
pub use event::{DynValue, Event};
pub use interceptor::{Direction, Interceptor, run_chain, run_interceptor_queue, switch_directions};
pub use query::{Query, QueryParams};
