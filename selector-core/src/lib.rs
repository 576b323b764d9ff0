//! Selector Core
//!
//! This crate derives values from an external store and tells a host
//! exactly when a derived value has changed. It implements:
//!
//! - Memoized selector evaluation with pluggable equality
//! - Store subscriptions that can be chained under a parent scope
//! - A two-phase (compute, then attach) engine with a re-invoke signal
//! - Correlation of selector faults across compute attempts
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `store`: the interface a store must provide
//! - `selector` / `equality`: projections and how their outputs are compared
//! - `subscription`: per-consumer subscription nodes
//! - `engine`: the selector cache and the sync engine
//! - `context`: thread-local store scopes
//! - `host`: a coalescing render queue for cooperative hosts
//!
//! # Example
//!
//! ```rust,ignore
//! use selector_core::{RenderQueue, ConsumerId, SelectInputs, Selector, SyncEngine};
//!
//! let queue = RenderQueue::new();
//! let id = ConsumerId::new();
//! let engine = SyncEngine::new(queue.notifier(id));
//!
//! let inputs = SelectInputs::new(store.clone(), Selector::new(|s: &AppState| s.counter));
//!
//! // Compute phase: read (or reuse) the derived value and commit it
//! let counter = engine.render(&inputs)?;
//!
//! // Deferred phase: subscribe to the store
//! engine.attach(&inputs);
//!
//! store.dispatch(Increment);
//! // The engine recomputed, saw a new value and queued `id` for re-invocation
//! assert!(queue.is_pending(id));
//! ```

pub mod config;
pub mod context;
pub mod diagnostics;
pub mod engine;
pub mod equality;
pub mod error;
pub mod host;
pub mod selector;
pub mod store;
pub mod subscription;

#[cfg(test)]
mod test_store;

pub use config::{CheckFrequency, SelectorOptions};
pub use context::{ScopeHandle, StoreScope};
pub use diagnostics::EngineSnapshot;
pub use engine::{Computed, Notify, Phase, SelectInputs, SelectorCache, SyncEngine};
pub use equality::{Equality, Shallow};
pub use error::{Result, SelectError, SelectorFault};
pub use host::{ConsumerId, RenderQueue};
pub use selector::Selector;
pub use store::{Listener, Store, StoreRef, Unsubscribe};
pub use subscription::{ListenerId, Subscription};
