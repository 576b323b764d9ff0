//! Store Scopes
//!
//! A scope makes a store available to every consumer created while the
//! scope is active, without threading the store through each call.
//!
//! # Implementation
//!
//! We use a thread-local stack of scopes. [`StoreScope::provide`] pushes a
//! root scope that owns a subscription directly on the store.
//! [`StoreScope::nest`] pushes a boundary whose subscription is chained under
//! the enclosing scope's, so consumers inside the boundary are notified
//! after the ones outside it. Each guard pops its scope (and releases its
//! subscription) when dropped.
//!
//! Scopes are looked up by state type, innermost first, so differently
//! typed stores can be provided side by side.

use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::engine::SelectInputs;
use crate::error::{Result, SelectError};
use crate::selector::Selector;
use crate::store::StoreRef;
use crate::subscription::Subscription;

thread_local! {
    static SCOPE_STACK: RefCell<Vec<ScopeEntry>> = RefCell::new(Vec::new());
}

fn next_scope_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// An entry in the scope stack.
#[derive(Clone)]
struct ScopeEntry {
    id: u64,
    /// A `StoreRef<S>` for the scope's state type.
    store: Arc<dyn Any + Send + Sync>,
    subscription: Arc<Subscription>,
}

/// The store and subscription that apply at the current point.
pub struct ScopeHandle<S> {
    pub store: StoreRef<S>,
    pub subscription: Arc<Subscription>,
}

impl<S> ScopeHandle<S> {
    /// Inputs for `selector` bound to this scope's store and chained under
    /// its subscription.
    pub fn inputs<R: PartialEq + 'static>(&self, selector: Selector<S, R>) -> SelectInputs<S, R> {
        SelectInputs::new(Arc::clone(&self.store), selector)
            .with_upstream(Arc::clone(&self.subscription))
    }
}

impl<S> Clone for ScopeHandle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            subscription: Arc::clone(&self.subscription),
        }
    }
}

/// Guard for an active scope. Dropping it pops the scope.
pub struct StoreScope {
    id: u64,
    subscription: Arc<Subscription>,
}

impl StoreScope {
    /// Provide `store` to everything that runs while the guard lives.
    ///
    /// The scope subscribes to the store immediately and forwards each
    /// change to the subscriptions chained under it.
    pub fn provide<S>(store: StoreRef<S>) -> Self
    where
        S: Send + Sync + 'static,
    {
        let subscription = Subscription::new(&store, None);
        forward_to_nested(&subscription);
        subscription.try_subscribe();
        Self::push(store, subscription)
    }

    /// Open a boundary under the innermost scope providing state `S`.
    ///
    /// The boundary only subscribes upstream once something registers
    /// under it.
    pub fn nest<S>() -> Result<Self>
    where
        S: Send + Sync + 'static,
    {
        let parent = Self::current::<S>()?;
        let subscription = Subscription::new(&parent.store, Some(parent.subscription));
        forward_to_nested(&subscription);
        Ok(Self::push(parent.store, subscription))
    }

    /// The innermost scope providing state `S`.
    pub fn current<S>() -> Result<ScopeHandle<S>>
    where
        S: Send + Sync + 'static,
    {
        SCOPE_STACK.with(|stack| {
            stack.borrow().iter().rev().find_map(|entry| {
                entry
                    .store
                    .downcast_ref::<StoreRef<S>>()
                    .map(|store| ScopeHandle {
                        store: Arc::clone(store),
                        subscription: Arc::clone(&entry.subscription),
                    })
            })
        })
        .ok_or(SelectError::NoStore)
    }

    /// Number of scopes active on this thread.
    pub fn depth() -> usize {
        SCOPE_STACK.with(|stack| stack.borrow().len())
    }

    /// This scope's subscription.
    pub fn subscription(&self) -> &Arc<Subscription> {
        &self.subscription
    }

    fn push<S>(store: StoreRef<S>, subscription: Arc<Subscription>) -> Self
    where
        S: Send + Sync + 'static,
    {
        let id = next_scope_id();
        SCOPE_STACK.with(|stack| {
            stack.borrow_mut().push(ScopeEntry {
                id,
                store: Arc::new(store),
                subscription: Arc::clone(&subscription),
            });
        });
        Self { id, subscription }
    }
}

impl Drop for StoreScope {
    fn drop(&mut self) {
        SCOPE_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Scopes must be dropped innermost first.
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.id, self.id,
                    "StoreScope mismatch: expected {}, got {}",
                    self.id, entry.id
                );
            }
        });
        self.subscription.clear_on_change();
        self.subscription.try_unsubscribe();
    }
}

/// Make `subscription` relay its changes to the nodes chained under it.
fn forward_to_nested(subscription: &Arc<Subscription>) {
    let weak = Arc::downgrade(subscription);
    subscription.set_on_change(Arc::new(move || {
        if let Some(subscription) = weak.upgrade() {
            subscription.notify_nested_subs();
        }
    }));
}
