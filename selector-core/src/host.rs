//! Render Queue
//!
//! The engine never re-runs a consumer itself; it only raises a "re-invoke"
//! signal. [`RenderQueue`] is a small cooperative host for that signal: it
//! collects signals per consumer, coalescing repeats, and hands consumers
//! back in the order they first asked.
//!
//! Coalescing is safe because the engine always re-reads the store when a
//! consumer is re-invoked; no information is carried by the signal itself.
//!
//! # Algorithm
//!
//! 1. Each engine gets a notifier bound to its [`ConsumerId`].
//! 2. A notifier inserts the ID into an insertion-ordered set.
//! 3. [`RenderQueue::flush`] drains the set and re-runs each consumer, then
//!    repeats while re-runs keep scheduling more work, up to a pass limit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{trace, warn};

/// Upper bound on drain passes in one [`RenderQueue::flush`].
pub const MAX_FLUSH_PASSES: usize = 100;

/// Unique identifier for a consumer driven by a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConsumerId(u64);

impl ConsumerId {
    /// Generate a new unique consumer ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Coalescing queue of consumers waiting to be re-invoked.
///
/// Clones share the same queue.
#[derive(Clone, Default)]
pub struct RenderQueue {
    pending: Arc<Mutex<IndexSet<ConsumerId>>>,
    signals: Arc<AtomicU64>,
}

impl RenderQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `id` for re-invocation.
    ///
    /// Returns `false` if it was already queued.
    pub fn schedule(&self, id: ConsumerId) -> bool {
        self.signals.fetch_add(1, Ordering::Relaxed);
        let inserted = self.pending.lock().insert(id);
        if !inserted {
            trace!(consumer = id.raw(), "re-invoke already queued, coalescing");
        }
        inserted
    }

    /// A re-invoke signal for `id`, suitable for [`SyncEngine::new`].
    ///
    /// [`SyncEngine::new`]: crate::engine::SyncEngine::new
    pub fn notifier(&self, id: ConsumerId) -> impl Fn() + Send + Sync + 'static {
        let queue = self.clone();
        move || {
            queue.schedule(id);
        }
    }

    /// Whether `id` is waiting to be re-invoked.
    pub fn is_pending(&self, id: ConsumerId) -> bool {
        self.pending.lock().contains(&id)
    }

    /// Number of queued consumers.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Total signals received, including coalesced ones.
    pub fn signals_received(&self) -> u64 {
        self.signals.load(Ordering::Relaxed)
    }

    /// Take every queued consumer, in first-signal order.
    pub fn drain(&self) -> Vec<ConsumerId> {
        self.pending.lock().drain(..).collect()
    }

    /// Re-run queued consumers until the queue stays empty.
    ///
    /// Returns the number of re-runs performed.
    pub fn flush<F>(&self, mut rerun: F) -> usize
    where
        F: FnMut(ConsumerId),
    {
        let mut runs = 0;
        for _ in 0..MAX_FLUSH_PASSES {
            let batch = self.drain();
            if batch.is_empty() {
                return runs;
            }
            for id in batch {
                rerun(id);
                runs += 1;
            }
        }

        if !self.is_empty() {
            warn!(
                passes = MAX_FLUSH_PASSES,
                pending = self.len(),
                "render queue did not settle, leaving remaining consumers queued"
            );
        }
        runs
    }
}

impl std::fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderQueue")
            .field("pending", &self.len())
            .field("signals", &self.signals_received())
            .finish()
    }
}
