//! Store subscriptions.
//!
//! Each consumer owns one [`Subscription`] node per (store, upstream) pair.
//! Nodes can be chained so that store changes propagate through a parent
//! scope before reaching the consumers nested under it.

mod listener;
mod node;

pub use listener::ListenerId;
pub use node::{same_upstream, Subscription};
