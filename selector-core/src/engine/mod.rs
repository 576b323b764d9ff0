//! Selector Engine
//!
//! This module holds the two halves of the engine: the per-consumer
//! [`SelectorCache`] that decides between recomputing and reusing, and the
//! [`SyncEngine`] that orders compute, commit, attach and the
//! recompute-and-notify cycle.
//!
//! # Lifecycle
//!
//! ```text
//!   Unattached ──attach──▶ Attaching ──subscribed──▶ Attached ──detach──▶ Detached
//!                              ▲                        │
//!                              └── store/upstream ──────┘
//!                                  identity changed
//! ```
//!
//! The cache lives as long as the engine and is overwritten in place. The
//! subscription node lives for one activation.

mod cache;
mod sync;

pub use cache::{Computed, SelectorCache};
pub use sync::{Notify, Phase, SelectInputs, SyncEngine};
