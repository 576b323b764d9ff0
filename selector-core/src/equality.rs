//! Equality Policies
//!
//! An [`Equality`] decides whether a freshly computed derived value counts as
//! "changed" relative to the cached one. When the policy says two values are
//! equal the engine keeps handing out the *cached* value, so a policy that
//! treats structurally equal outputs as equal also stabilizes their identity.
//!
//! Three policies ship with the crate:
//!
//! - [`Equality::strict`]: `PartialEq`. This is the default.
//! - [`Equality::by_ptr`]: pointer identity for `Arc` outputs.
//! - [`Equality::shallow`]: one level deep, comparing the `Arc` entries of a
//!   collection by pointer.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::sync::Arc;

use indexmap::IndexMap;

/// A comparison between two derived values.
///
/// Policies must be total and free of side effects. Only their behavior
/// matters; two distinct policy instances with the same behavior are
/// interchangeable.
pub struct Equality<R> {
    compare: Arc<dyn Fn(&R, &R) -> bool + Send + Sync>,
}

impl<R> Equality<R> {
    /// Build a policy from a comparison function.
    pub fn new<F>(compare: F) -> Self
    where
        F: Fn(&R, &R) -> bool + Send + Sync + 'static,
    {
        Self {
            compare: Arc::new(compare),
        }
    }

    /// Whether `a` and `b` count as the same derived value.
    pub fn equals(&self, a: &R, b: &R) -> bool {
        (self.compare)(a, b)
    }
}

impl<R: PartialEq + 'static> Equality<R> {
    /// Compare with `PartialEq`.
    pub fn strict() -> Self {
        Self::new(|a: &R, b: &R| a == b)
    }
}

impl<T: ?Sized + 'static> Equality<Arc<T>> {
    /// Compare `Arc` outputs by pointer identity.
    pub fn by_ptr() -> Self {
        Self::new(|a: &Arc<T>, b: &Arc<T>| std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)))
    }
}

impl<R: Shallow + 'static> Equality<R> {
    /// Compare one level deep, see [`Shallow`].
    pub fn shallow() -> Self {
        Self::new(|a: &R, b: &R| a.shallow_eq(b))
    }
}

impl<R: PartialEq + 'static> Default for Equality<R> {
    fn default() -> Self {
        Self::strict()
    }
}

impl<R> Clone for Equality<R> {
    fn clone(&self) -> Self {
        Self {
            compare: Arc::clone(&self.compare),
        }
    }
}

impl<R> fmt::Debug for Equality<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Equality")
    }
}

/// One-level-deep equality.
///
/// Collections are shallow-equal when they have the same shape (length and,
/// for maps, the same keys) and every entry is the same `Arc` allocation.
pub trait Shallow {
    /// Whether `self` and `other` are shallow-equal.
    fn shallow_eq(&self, other: &Self) -> bool;
}

fn same_arc<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl<T: ?Sized> Shallow for [Arc<T>] {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other).all(|(a, b)| same_arc(a, b))
    }
}

impl<T: ?Sized> Shallow for Vec<Arc<T>> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.as_slice().shallow_eq(other.as_slice())
    }
}

impl<K, V, S> Shallow for IndexMap<K, Arc<V>, S>
where
    K: Hash + Eq,
    V: ?Sized,
    S: BuildHasher,
{
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, a)| other.get(key).is_some_and(|b| same_arc(a, b)))
    }
}

impl<K, V, S> Shallow for HashMap<K, Arc<V>, S>
where
    K: Hash + Eq,
    V: ?Sized,
    S: BuildHasher,
{
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, a)| other.get(key).is_some_and(|b| same_arc(a, b)))
    }
}

impl<K: Ord, V: ?Sized> Shallow for BTreeMap<K, Arc<V>> {
    fn shallow_eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, a)| other.get(key).is_some_and(|b| same_arc(a, b)))
    }
}

impl<T: Shallow + ?Sized> Shallow for Arc<T> {
    fn shallow_eq(&self, other: &Self) -> bool {
        same_arc(self, other) || (**self).shallow_eq(&**other)
    }
}
