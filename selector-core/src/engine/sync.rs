//! Sync Engine
//!
//! The engine drives one consumer through two ordered phases:
//!
//! 1. **Compute** ([`SyncEngine::select`], then [`SyncEngine::commit`]):
//!    synchronously compute or reuse the derived value, hand it to the host,
//!    and once the host has shown it, record it in the cache.
//!
//! 2. **Attach** ([`SyncEngine::attach`]): deferred until after the commit.
//!    Builds a subscription node for the (store, upstream) pair, subscribes,
//!    and immediately runs one recompute pass so a store change that landed
//!    between the compute phase and the subscription is not lost. The node
//!    is rebuilt only when the store or upstream identity changes.
//!
//! After attaching, every store change runs the committed selector against
//! the fresh state. An unequal result is written to the cache and the host
//! is asked to re-invoke the consumer. A selector fault is recorded instead
//! of propagated, and the host is asked to re-invoke so the compute phase
//! can raise it (or recover) through the normal path.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use super::cache::SelectorCache;
use crate::config::SelectorOptions;
use crate::diagnostics::EngineSnapshot;
use crate::equality::Equality;
use crate::error::Result;
use crate::selector::Selector;
use crate::store::{same_store, StoreRef};
use crate::subscription::{same_upstream, Subscription};

/// The host's "re-invoke me" signal.
pub type Notify = Arc<dyn Fn() + Send + Sync>;

/// Attachment state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No subscription has been set up yet.
    Unattached,
    /// A node exists and is being subscribed.
    Attaching,
    /// Subscribed and reacting to store changes.
    Attached,
    /// Torn down. Attaching again starts a fresh activation.
    Detached,
}

/// Everything the consumer passes on each invocation.
pub struct SelectInputs<S, R> {
    /// The store to read from. Identity-significant.
    pub store: StoreRef<S>,
    /// The projection. Identity-significant.
    pub selector: Selector<S, R>,
    /// How to compare derived values.
    pub equality: Equality<R>,
    /// Parent subscription to chain under. Identity-significant.
    pub upstream: Option<Arc<Subscription>>,
}

impl<S, R: PartialEq + 'static> SelectInputs<S, R> {
    /// Inputs with strict equality and no upstream subscription.
    pub fn new(store: StoreRef<S>, selector: Selector<S, R>) -> Self {
        Self {
            store,
            selector,
            equality: Equality::strict(),
            upstream: None,
        }
    }
}

impl<S, R> SelectInputs<S, R> {
    /// Replace the equality policy.
    pub fn with_equality(mut self, equality: Equality<R>) -> Self {
        self.equality = equality;
        self
    }

    /// Chain under an upstream subscription.
    pub fn with_upstream(mut self, upstream: Arc<Subscription>) -> Self {
        self.upstream = Some(upstream);
        self
    }
}

impl<S, R> Clone for SelectInputs<S, R> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            selector: self.selector.clone(),
            equality: self.equality.clone(),
            upstream: self.upstream.clone(),
        }
    }
}

/// A computed value waiting for the host to commit it.
struct Pending<S, R> {
    selector: Selector<S, R>,
    equality: Equality<R>,
    raw_state: Arc<S>,
    derived: R,
}

#[derive(Default)]
struct Stats {
    selector_runs: AtomicU64,
    notifications: AtomicU64,
    attach_cycles: AtomicU64,
    deferred_faults: AtomicU64,
    stability_warnings: AtomicU64,
    identity_warnings: AtomicU64,
}

/// State reachable from the change callback installed on a node.
struct Shared<S, R> {
    cache: Mutex<SelectorCache<S, R>>,
    notify: Notify,
    stats: Stats,
}

impl<S, R> Shared<S, R>
where
    S: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Recompute against the current store state and notify on change.
    fn check_for_updates(&self, store: &StoreRef<S>) {
        let (selector, equality, cached) = {
            let cache = self.cache.lock();
            match (cache.selector(), cache.equality()) {
                (Some(selector), Some(equality)) => {
                    (selector.clone(), equality.clone(), cache.derived().cloned())
                }
                _ => return,
            }
        };

        let raw_state = store.state();
        self.stats.selector_runs.fetch_add(1, Ordering::Relaxed);

        match selector.select(&raw_state) {
            Err(fault) => {
                debug!(error = %fault, "selector failed during recompute, deferring to next compute");
                self.cache.lock().store_error(fault);
                self.stats.deferred_faults.fetch_add(1, Ordering::Relaxed);
                self.signal();
            }
            Ok(fresh) => {
                if let Some(cached) = &cached {
                    if equality.equals(&fresh, cached) {
                        trace!("derived value unchanged, skipping notify");
                        return;
                    }
                }
                self.cache.lock().store_recomputed(raw_state, fresh);
                self.signal();
            }
        }
    }

    fn signal(&self) {
        self.stats.notifications.fetch_add(1, Ordering::Relaxed);
        (self.notify)();
    }
}

/// The node the engine is currently attached through.
struct Attachment<S> {
    store: StoreRef<S>,
    upstream: Option<Arc<Subscription>>,
    node: Arc<Subscription>,
    /// Cleared on detach so late notifications become no-ops.
    active: Arc<AtomicBool>,
}

impl<S> Attachment<S> {
    /// Deactivate and unsubscribe the node.
    fn release(self) {
        self.active.store(false, Ordering::SeqCst);
        self.node.clear_on_change();
        self.node.try_unsubscribe();
    }
}

/// Selector memoization and change detection for one consumer.
///
/// Dropping the engine detaches it.
///
/// # Example
///
/// ```rust,ignore
/// let engine = SyncEngine::new(move || host.schedule(id));
/// let inputs = SelectInputs::new(store, Selector::new(|s: &AppState| s.counter));
///
/// let counter = engine.render(&inputs)?;  // compute + commit
/// engine.attach(&inputs);                 // deferred phase
/// ```
pub struct SyncEngine<S, R> {
    shared: Arc<Shared<S, R>>,
    pending: Mutex<Option<Pending<S, R>>>,
    attachment: Mutex<Option<Attachment<S>>>,
    phase: Mutex<Phase>,
    options: SelectorOptions,
    first_run: AtomicBool,
}

impl<S, R> SyncEngine<S, R>
where
    S: Send + Sync + 'static,
    R: Clone + Send + Sync + 'static,
{
    /// Create an engine that calls `notify` whenever the consumer should be
    /// re-invoked.
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_options(notify, SelectorOptions::default())
    }

    /// Create an engine with explicit options.
    pub fn with_options<F>(notify: F, options: SelectorOptions) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                cache: Mutex::new(SelectorCache::new()),
                notify: Arc::new(notify),
                stats: Stats::default(),
            }),
            pending: Mutex::new(None),
            attachment: Mutex::new(None),
            phase: Mutex::new(Phase::Unattached),
            options,
            first_run: AtomicBool::new(true),
        }
    }

    /// Compute the derived value for the current store state.
    ///
    /// Reuses the cached value when neither the selector nor the state
    /// changed since the last commit. On success the value is staged for
    /// [`commit`](Self::commit). A selector fault is returned, correlated
    /// with any fault deferred from the asynchronous phase, and the deferred
    /// fault is cleared.
    pub fn select(&self, inputs: &SelectInputs<S, R>) -> Result<R> {
        let raw_state = inputs.store.state();
        let cache = self.shared.cache.lock().clone();

        let computed = match cache.compute_or_reuse(&inputs.selector, &inputs.equality, &raw_state) {
            Ok(computed) => computed,
            Err(fault) => {
                self.shared.stats.selector_runs.fetch_add(1, Ordering::Relaxed);
                if self.shared.cache.lock().take_error().is_some() {
                    debug!("deferred selector fault reported through compute");
                }
                self.pending.lock().take();
                return Err(fault.into());
            }
        };

        if computed.recomputed {
            self.shared.stats.selector_runs.fetch_add(1, Ordering::Relaxed);
            self.run_checks(inputs, &raw_state, &computed.value);
        } else {
            trace!("selector and state unchanged, reusing cached value");
        }

        *self.pending.lock() = Some(Pending {
            selector: inputs.selector.clone(),
            equality: inputs.equality.clone(),
            raw_state,
            derived: computed.value.clone(),
        });

        Ok(computed.value)
    }

    /// Record the last value returned by [`select`](Self::select) as the one
    /// the consumer observed. Must run before [`attach`](Self::attach).
    pub fn commit(&self) {
        let pending = self.pending.lock().take();
        if let Some(pending) = pending {
            self.shared.cache.lock().commit(
                pending.selector,
                pending.equality,
                pending.raw_state,
                pending.derived,
            );
        }
    }

    /// [`select`](Self::select) followed by [`commit`](Self::commit).
    pub fn render(&self, inputs: &SelectInputs<S, R>) -> Result<R> {
        let value = self.select(inputs)?;
        self.commit();
        Ok(value)
    }

    /// Subscribe to the store, or keep the existing subscription when the
    /// store and upstream identities are unchanged.
    ///
    /// A value staged by [`select`](Self::select) but not yet committed is
    /// committed first, so the recompute pass compares against what the
    /// consumer was shown.
    pub fn attach(&self, inputs: &SelectInputs<S, R>) {
        self.commit();

        {
            let attachment = self.attachment.lock();
            if let Some(current) = attachment.as_ref() {
                if same_store(&current.store, &inputs.store)
                    && same_upstream(current.upstream.as_ref(), inputs.upstream.as_ref())
                    && current.active.load(Ordering::SeqCst)
                {
                    return;
                }
            }
        }

        if self.release_attachment() {
            debug!("store or upstream changed, rebuilding subscription");
        }

        let node = Subscription::new(&inputs.store, inputs.upstream.clone());
        let active = Arc::new(AtomicBool::new(true));

        let shared = Arc::clone(&self.shared);
        let store = Arc::clone(&inputs.store);
        let flag = Arc::clone(&active);
        node.set_on_change(Arc::new(move || {
            if flag.load(Ordering::SeqCst) {
                shared.check_for_updates(&store);
            }
        }));

        *self.attachment.lock() = Some(Attachment {
            store: Arc::clone(&inputs.store),
            upstream: inputs.upstream.clone(),
            node: Arc::clone(&node),
            active: Arc::clone(&active),
        });
        self.set_phase(Phase::Attaching);
        self.shared.stats.attach_cycles.fetch_add(1, Ordering::Relaxed);

        node.try_subscribe();

        if !active.load(Ordering::SeqCst) {
            // Detached while the store was registering us.
            node.try_unsubscribe();
            return;
        }

        self.set_phase(Phase::Attached);
        debug!(chained = inputs.upstream.is_some(), "attached to store");

        // Catch changes made between the compute phase and subscribing.
        node.handle_change_wrapper();
    }

    /// Unsubscribe. Later store changes no longer reach the engine.
    pub fn detach(&self) {
        if self.release_attachment() {
            self.set_phase(Phase::Detached);
            debug!("detached from store");
        }
    }

    fn release_attachment(&self) -> bool {
        let attachment = self.attachment.lock().take();
        attachment.map(Attachment::release).is_some()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    fn run_checks(&self, inputs: &SelectInputs<S, R>, raw_state: &Arc<S>, value: &R) {
        let first_run = self.first_run.swap(false, Ordering::SeqCst);

        if self.options.stability_check.applies(first_run) {
            self.shared.stats.selector_runs.fetch_add(1, Ordering::Relaxed);
            if let Ok(again) = inputs.selector.select(raw_state) {
                if !inputs.equality.equals(value, &again) {
                    self.shared.stats.stability_warnings.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "selector returned a different result when called with the same state; \
                         this causes needless re-invocations, consider memoizing its output"
                    );
                }
            }
        }

        if self.options.identity_function_check.applies(first_run) {
            let value: &dyn Any = value;
            if let Some(root) = value.downcast_ref::<Arc<S>>() {
                if Arc::ptr_eq(root, raw_state) {
                    self.shared.stats.identity_warnings.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        "selector returned the root state; the consumer will be re-invoked \
                         on every store change"
                    );
                }
            }
        }
    }

    /// Current attachment phase.
    pub fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    /// The cached derived value, for inspection only.
    pub fn debug_value(&self) -> Option<R> {
        self.shared.cache.lock().derived().cloned()
    }

    /// Whether an asynchronous fault is waiting for the next compute.
    pub fn has_deferred_fault(&self) -> bool {
        self.shared.cache.lock().error().is_some()
    }

    /// Counters and flags for diagnostics tooling.
    pub fn snapshot(&self) -> EngineSnapshot {
        let (has_value, has_error) = {
            let cache = self.shared.cache.lock();
            (cache.derived().is_some(), cache.error().is_some())
        };
        let stats = &self.shared.stats;
        EngineSnapshot {
            phase: self.phase(),
            has_value,
            has_error,
            pending_commit: self.pending.lock().is_some(),
            selector_runs: stats.selector_runs.load(Ordering::Relaxed),
            notifications: stats.notifications.load(Ordering::Relaxed),
            attach_cycles: stats.attach_cycles.load(Ordering::Relaxed),
            deferred_faults: stats.deferred_faults.load(Ordering::Relaxed),
            stability_warnings: stats.stability_warnings.load(Ordering::Relaxed),
            identity_warnings: stats.identity_warnings.load(Ordering::Relaxed),
        }
    }
}

impl<S, R> Drop for SyncEngine<S, R> {
    fn drop(&mut self) {
        if let Some(attachment) = self.attachment.get_mut().take() {
            attachment.release();
        }
    }
}

impl<S, R> std::fmt::Debug for SyncEngine<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("phase", &*self.phase.lock())
            .field("cache", &*self.shared.cache.lock())
            .field("options", &self.options)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
