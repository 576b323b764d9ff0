//! Subscription Node
//!
//! A [`Subscription`] binds one store (and optionally one upstream
//! subscription) to a single owner. It exposes:
//!
//! - an assignable `on_change` slot, invoked when the store changes
//! - `try_subscribe` / `try_unsubscribe`, which acquire and release the
//!   underlying registration exactly once
//! - nested listeners, so other nodes can chain underneath this one
//!
//! # Chaining
//!
//! A node without a parent registers directly with the store. A node with a
//! parent registers with the parent through [`Subscription::add_nested_sub`],
//! and only hears about store changes when the parent forwards them with
//! [`Subscription::notify_nested_subs`]. This lets a subtree boundary make
//! sure its own consumers run before the ones nested under it.
//!
//! # Re-entrancy
//!
//! No internal lock is held while store code or listeners run. The store
//! only holds a weak reference to the node, so dropping the last strong
//! handle turns any late notification into a no-op.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::listener::ListenerSet;
use crate::store::{Listener, StoreRef, Unsubscribe};

type SubscribeFn = Arc<dyn Fn(Listener) -> Unsubscribe + Send + Sync>;

/// Where a node gets its change notifications from.
enum Source {
    Store(SubscribeFn),
    Parent(Arc<Subscription>),
}

/// A store subscription owned by exactly one consumer or scope.
pub struct Subscription {
    me: Weak<Subscription>,
    source: Source,

    /// Single-slot change callback.
    on_change: Mutex<Option<Listener>>,

    /// Release handle for the active registration. `Some` while subscribed.
    unsubscribe: Mutex<Option<Unsubscribe>>,

    /// Listeners of nested subscriptions.
    nested: Arc<Mutex<ListenerSet>>,
}

impl Subscription {
    /// Create an unsubscribed node bound to `store`, chained under `parent`
    /// when one is given.
    pub fn new<S>(store: &StoreRef<S>, parent: Option<Arc<Subscription>>) -> Arc<Self>
    where
        S: Send + Sync + 'static,
    {
        let source = match parent {
            Some(parent) => Source::Parent(parent),
            None => {
                let store = Arc::clone(store);
                Source::Store(Arc::new(move |listener: Listener| store.subscribe(listener)))
            }
        };

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            source,
            on_change: Mutex::new(None),
            unsubscribe: Mutex::new(None),
            nested: Arc::new(Mutex::new(ListenerSet::default())),
        })
    }

    /// The upstream subscription, if this node is chained.
    pub fn parent(&self) -> Option<&Arc<Subscription>> {
        match &self.source {
            Source::Parent(parent) => Some(parent),
            Source::Store(_) => None,
        }
    }

    /// Install the change callback, replacing any previous one.
    pub fn set_on_change(&self, listener: Listener) {
        *self.on_change.lock() = Some(listener);
    }

    /// Remove the change callback.
    pub fn clear_on_change(&self) {
        self.on_change.lock().take();
    }

    /// Invoke the change callback, if one is installed.
    ///
    /// This is the listener the node registers upstream.
    pub fn handle_change_wrapper(&self) {
        let callback = self.on_change.lock().clone();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Register a nested listener, subscribing this node first if needed.
    pub fn add_nested_sub(&self, listener: Listener) -> Unsubscribe {
        self.try_subscribe();
        let id = self.nested.lock().insert(listener);
        let nested = Arc::downgrade(&self.nested);
        Unsubscribe::new(move || {
            if let Some(nested) = nested.upgrade() {
                nested.lock().remove(id);
            }
        })
    }

    /// Notify nested listeners in registration order.
    pub fn notify_nested_subs(&self) {
        let batch = self.nested.lock().snapshot();
        for listener in batch {
            listener();
        }
    }

    /// Number of nested listeners currently registered.
    pub fn nested_count(&self) -> usize {
        self.nested.lock().len()
    }

    /// Whether the node currently holds an upstream registration.
    pub fn is_subscribed(&self) -> bool {
        self.unsubscribe.lock().is_some()
    }

    /// Acquire the upstream registration unless already held.
    pub fn try_subscribe(&self) {
        if self.is_subscribed() {
            return;
        }

        let me = self.me.clone();
        let handler: Listener = Arc::new(move || {
            if let Some(node) = me.upgrade() {
                node.handle_change_wrapper();
            }
        });

        let release = match &self.source {
            Source::Store(subscribe) => subscribe(handler),
            Source::Parent(parent) => parent.add_nested_sub(handler),
        };

        let mut slot = self.unsubscribe.lock();
        if slot.is_some() {
            // Subscribed re-entrantly while the store was registering us.
            drop(slot);
            release.call();
            return;
        }
        *slot = Some(release);
    }

    /// Release the upstream registration and drop nested listeners.
    ///
    /// Safe to call any number of times; only the first call after a
    /// successful `try_subscribe` releases anything.
    pub fn try_unsubscribe(&self) {
        let release = self.unsubscribe.lock().take();
        if let Some(release) = release {
            self.nested.lock().clear();
            release.call();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("subscribed", &self.is_subscribed())
            .field("chained", &self.parent().is_some())
            .field("nested_count", &self.nested_count())
            .finish()
    }
}

/// Whether two optional upstream subscriptions are the same node.
pub fn same_upstream(a: Option<&Arc<Subscription>>, b: Option<&Arc<Subscription>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}
