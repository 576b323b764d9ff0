//! In-memory store used by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::store::{Listener, Store, Unsubscribe};

pub(crate) struct TestStore<S> {
    state: Mutex<Arc<S>>,
    listeners: Arc<Mutex<IndexMap<usize, Listener>>>,
    next_id: AtomicUsize,
    subscribes: AtomicUsize,
    unsubscribes: Arc<AtomicUsize>,
}

impl<S: Send + Sync + 'static> TestStore<S> {
    pub(crate) fn new(state: S) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(Arc::new(state)),
            listeners: Arc::new(Mutex::new(IndexMap::new())),
            next_id: AtomicUsize::new(0),
            subscribes: AtomicUsize::new(0),
            unsubscribes: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Replace the state with a fresh allocation and notify listeners.
    pub(crate) fn set(&self, state: S) {
        *self.state.lock() = Arc::new(state);
        self.emit();
    }

    /// Notify listeners without changing the state.
    pub(crate) fn emit(&self) {
        let batch: Vec<Listener> = self.listeners.lock().values().cloned().collect();
        for listener in batch {
            listener();
        }
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub(crate) fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn unsubscribe_count(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

impl<S: Send + Sync + 'static> Store for TestStore<S> {
    type State = S;

    fn state(&self) -> Arc<S> {
        self.state.lock().clone()
    }

    fn subscribe(&self, listener: Listener) -> Unsubscribe {
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
