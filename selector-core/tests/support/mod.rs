//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use selector_core::{Listener, Store, StoreRef, Unsubscribe};

/// Application state used across tests.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub counter: i32,
    pub items: Vec<String>,
}

impl AppState {
    pub fn with_counter(counter: i32) -> Self {
        Self {
            counter,
            items: Vec::new(),
        }
    }
}

type SubscribeHook<S> = Box<dyn FnOnce(&MemoryStore<S>) + Send>;

/// A minimal store: replace-the-state updates, listeners in registration order.
pub struct MemoryStore<S> {
    state: Mutex<Arc<S>>,
    listeners: Arc<Mutex<IndexMap<u64, Listener>>>,
    next_id: AtomicU64,
    subscribes: AtomicUsize,
    unsubscribes: Arc<AtomicUsize>,
    on_subscribe: Mutex<Option<SubscribeHook<S>>>,
}

impl<S: Send + Sync + 'static> MemoryStore<S> {
    pub fn new(state: S) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Arc::new(state)),
            listeners: Arc::new(Mutex::new(IndexMap::new())),
            next_id: AtomicU64::new(0),
            subscribes: AtomicUsize::new(0),
            unsubscribes: Arc::new(AtomicUsize::new(0)),
            on_subscribe: Mutex::new(None),
        })
    }

    /// Shared handle usable as engine input.
    pub fn handle(self: &Arc<Self>) -> StoreRef<S> {
        self.clone()
    }

    /// Replace the state with a new allocation and notify listeners.
    pub fn replace(&self, state: S) {
        *self.state.lock() = Arc::new(state);
        self.emit();
    }

    /// Notify listeners without touching the state.
    pub fn emit(&self) {
        let batch: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in batch {
            listener();
        }
    }

    /// Run `hook` once, at the start of the next `subscribe` call.
    pub fn on_next_subscribe<F>(&self, hook: F)
    where
        F: FnOnce(&MemoryStore<S>) + Send + 'static,
    {
        *self.on_subscribe.lock() = Some(Box::new(hook));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

impl<S: Send + Sync + 'static> Store for MemoryStore<S> {
    type State = S;

    fn state(&self) -> Arc<S> {
        self.state.lock().clone()
    }

    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        let hook = self.on_subscribe.lock().take();
        if let Some(hook) = hook {
            hook(self);
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.lock().insert(id, listener);
        self.subscribes.fetch_add(1, Ordering::SeqCst);

        let listeners = Arc::clone(&self.listeners);
        let unsubscribes = Arc::clone(&self.unsubscribes);
        Unsubscribe::new(move || {
            listeners.lock().shift_remove(&id);
            unsubscribes.fetch_add(1, Ordering::SeqCst);
        })
    }
}

/// A re-invoke signal that counts how often it fired.
pub fn counting_notify() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
    let count = Arc::new(AtomicUsize::new(0));
    let count_clone = count.clone();
    (count, move || {
        count_clone.fetch_add(1, Ordering::SeqCst);
    })
}
