//! Listener bookkeeping for subscription nodes.
//!
//! A node keeps the listeners of its nested subscriptions in registration
//! order and hands out a snapshot before notifying, so listeners are free to
//! unsubscribe (or subscribe others) while a notification is in flight.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::store::Listener;

/// Unique identifier for a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Generate a new unique listener ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of listeners taken for one notification pass.
pub(crate) type ListenerBatch = SmallVec<[Listener; 4]>;

/// Ordered collection of nested listeners.
#[derive(Default)]
pub(crate) struct ListenerSet {
    entries: IndexMap<ListenerId, Listener>,
}

impl ListenerSet {
    pub(crate) fn insert(&mut self, listener: Listener) -> ListenerId {
        let id = ListenerId::new();
        self.entries.insert(id, listener);
        id
    }

    /// Remove a listener, keeping the others in registration order.
    pub(crate) fn remove(&mut self, id: ListenerId) -> bool {
        self.entries.shift_remove(&id).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn snapshot(&self) -> ListenerBatch {
        self.entries.values().cloned().collect()
    }
}
