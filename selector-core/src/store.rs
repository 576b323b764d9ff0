//! Store Interface
//!
//! The engine never owns state. It consumes a store that can hand out a
//! snapshot of its current state and tell interested parties when that
//! state changes.
//!
//! # Identity
//!
//! Stores are shared as [`StoreRef`] (`Arc<dyn Store>`). Two references name
//! the same store exactly when they point at the same allocation; the engine
//! rebuilds its subscription whenever the store it is handed changes
//! identity.
//!
//! State snapshots are returned as `Arc<S>` so the engine can compare them by
//! pointer. A store that returns the same `Arc` for an unchanged state lets
//! the engine skip running the selector entirely.

use std::fmt;
use std::sync::Arc;

/// A callback invoked when a store (or upstream subscription) changes.
pub type Listener = Arc<dyn Fn() + Send + Sync>;

/// Shared handle to a store.
pub type StoreRef<S> = Arc<dyn Store<State = S>>;

/// A mutable external state container.
pub trait Store: Send + Sync {
    /// The state type held by the store.
    type State;

    /// Read the current state snapshot. Must not have side effects.
    fn state(&self) -> Arc<Self::State>;

    /// Register a change listener.
    ///
    /// Dropping the returned [`Unsubscribe`] without calling it leaves the
    /// listener registered.
    fn subscribe(&self, listener: Listener) -> Unsubscribe;
}

/// Release handle returned by [`Store::subscribe`].
///
/// Consumed on use, so a registration can be released at most once.
pub struct Unsubscribe(Box<dyn FnOnce() + Send>);

impl Unsubscribe {
    /// Wrap a release closure.
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(release))
    }

    /// A handle that releases nothing.
    pub fn noop() -> Self {
        Self::new(|| {})
    }

    /// Release the registration.
    pub fn call(self) {
        (self.0)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Unsubscribe")
    }
}

/// Whether two store handles refer to the same store.
pub fn same_store<S>(a: &StoreRef<S>, b: &StoreRef<S>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
