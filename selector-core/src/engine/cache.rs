//! Selector Cache
//!
//! The cache remembers what the consumer was last shown: the selector that
//! produced it, the raw state it was produced from, and the derived value
//! itself. It also remembers the last fault raised by an asynchronous
//! recompute.
//!
//! # How the Cache Decides
//!
//! 1. Same selector instance, same state snapshot, no pending fault:
//!    return the cached derived value without running the selector.
//!
//! 2. Otherwise run the selector. A fault is returned to the caller,
//!    correlated with the pending fault when there is one.
//!
//! 3. A fresh value that the equality policy considers equal to the cached
//!    one is replaced by the cached one, so downstream identity stays stable.
//!
//! Deciding never mutates the cache. Writing happens in a separate commit
//! once the host has actually shown the value.

use std::fmt;
use std::sync::Arc;

use crate::equality::Equality;
use crate::error::SelectorFault;
use crate::selector::Selector;

/// Result of [`SelectorCache::compute_or_reuse`].
#[derive(Debug, Clone)]
pub struct Computed<R> {
    /// The value to hand to the consumer.
    pub value: R,
    /// Whether the selector actually ran.
    pub recomputed: bool,
    /// Whether an asynchronous fault was pending when the value was computed.
    pub had_error: bool,
}

/// Cross-cycle memory for one consumer.
pub struct SelectorCache<S, R> {
    selector: Option<Selector<S, R>>,
    raw_state: Option<Arc<S>>,
    derived: Option<R>,
    error: Option<SelectorFault>,
    equality: Option<Equality<R>>,
}

impl<S, R: Clone> SelectorCache<S, R> {
    /// An empty cache.
    pub fn new() -> Self {
        Self {
            selector: None,
            raw_state: None,
            derived: None,
            error: None,
            equality: None,
        }
    }

    /// Whether `selector` run against `raw_state` would produce exactly the
    /// cached value.
    pub fn can_reuse(&self, selector: &Selector<S, R>, raw_state: &Arc<S>) -> bool {
        self.error.is_none()
            && self.selector.as_ref().is_some_and(|s| s.same(selector))
            && self.raw_state.as_ref().is_some_and(|s| Arc::ptr_eq(s, raw_state))
    }

    /// Compute the derived value for `raw_state`, reusing the cache when
    /// possible.
    pub fn compute_or_reuse(
        &self,
        selector: &Selector<S, R>,
        equality: &Equality<R>,
        raw_state: &Arc<S>,
    ) -> Result<Computed<R>, SelectorFault> {
        let had_error = self.error.is_some();

        if self.can_reuse(selector, raw_state) {
            if let Some(derived) = &self.derived {
                return Ok(Computed {
                    value: derived.clone(),
                    recomputed: false,
                    had_error,
                });
            }
        }

        let fresh = match selector.select(raw_state) {
            Ok(value) => value,
            Err(fault) => {
                return Err(match &self.error {
                    Some(previous) => fault.correlate(previous),
                    None => fault,
                });
            }
        };

        let value = match &self.derived {
            Some(cached) if equality.equals(&fresh, cached) => cached.clone(),
            _ => fresh,
        };

        Ok(Computed {
            value,
            recomputed: true,
            had_error,
        })
    }

    /// Record what the consumer was shown. Clears any pending fault.
    pub fn commit(
        &mut self,
        selector: Selector<S, R>,
        equality: Equality<R>,
        raw_state: Arc<S>,
        derived: R,
    ) {
        self.selector = Some(selector);
        self.equality = Some(equality);
        self.raw_state = Some(raw_state);
        self.derived = Some(derived);
        self.error = None;
    }

    /// Record a value produced by an asynchronous recompute.
    pub(crate) fn store_recomputed(&mut self, raw_state: Arc<S>, derived: R) {
        self.raw_state = Some(raw_state);
        self.derived = Some(derived);
    }

    /// Record a fault raised by an asynchronous recompute.
    pub(crate) fn store_error(&mut self, fault: SelectorFault) {
        self.error = Some(fault);
    }

    /// Drop the pending fault, returning it.
    pub(crate) fn take_error(&mut self) -> Option<SelectorFault> {
        self.error.take()
    }

    /// The last committed selector.
    pub fn selector(&self) -> Option<&Selector<S, R>> {
        self.selector.as_ref()
    }

    /// The equality policy that came with the last commit.
    pub fn equality(&self) -> Option<&Equality<R>> {
        self.equality.as_ref()
    }

    /// The raw state the cached value was derived from.
    pub fn raw_state(&self) -> Option<&Arc<S>> {
        self.raw_state.as_ref()
    }

    /// The cached derived value.
    pub fn derived(&self) -> Option<&R> {
        self.derived.as_ref()
    }

    /// The pending asynchronous fault.
    pub fn error(&self) -> Option<&SelectorFault> {
        self.error.as_ref()
    }
}

impl<S, R: Clone> Default for SelectorCache<S, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, R: Clone> Clone for SelectorCache<S, R> {
    fn clone(&self) -> Self {
        Self {
            selector: self.selector.clone(),
            raw_state: self.raw_state.clone(),
            derived: self.derived.clone(),
            error: self.error.clone(),
            equality: self.equality.clone(),
        }
    }
}

impl<S, R> fmt::Debug for SelectorCache<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorCache")
            .field("has_selector", &self.selector.is_some())
            .field("has_state", &self.raw_state.is_some())
            .field("has_value", &self.derived.is_some())
            .field("has_error", &self.error.is_some())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
