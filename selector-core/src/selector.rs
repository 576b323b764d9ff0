//! Selectors
//!
//! A [`Selector`] is a pure projection from store state to a derived value.
//! Selectors are identity-significant: the engine only skips running a
//! selector when it is handed the *same* selector instance (a clone of the
//! same handle) as last time. Building a new selector from an identical
//! closure counts as a new selector.

use std::fmt;
use std::sync::Arc;

use crate::error::SelectorFault;

/// Shared handle to a selector function.
pub struct Selector<S, R> {
    run: Arc<dyn Fn(&S) -> Result<R, SelectorFault> + Send + Sync>,
}

impl<S, R> Selector<S, R> {
    /// Wrap an infallible projection.
    pub fn new<F>(project: F) -> Self
    where
        F: Fn(&S) -> R + Send + Sync + 'static,
        S: 'static,
        R: 'static,
    {
        Self {
            run: Arc::new(move |state: &S| Ok(project(state))),
        }
    }

    /// Wrap a projection that can fail.
    pub fn fallible<F>(project: F) -> Self
    where
        F: Fn(&S) -> Result<R, SelectorFault> + Send + Sync + 'static,
    {
        Self {
            run: Arc::new(project),
        }
    }

    /// Run the selector against a state snapshot.
    pub fn select(&self, state: &S) -> Result<R, SelectorFault> {
        (self.run)(state)
    }

    /// Whether `self` and `other` are the same selector instance.
    pub fn same(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.run), Arc::as_ptr(&other.run))
    }
}

impl<S, R> Clone for Selector<S, R> {
    fn clone(&self) -> Self {
        Self {
            run: Arc::clone(&self.run),
        }
    }
}

impl<S, R> fmt::Debug for Selector<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Selector")
            .field("ptr", &Arc::as_ptr(&self.run).cast::<()>())
            .finish()
    }
}
