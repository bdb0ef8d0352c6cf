//! In-place-updatable numdict variant.

use crate::key::Key;
use crate::numdict::NumDict;
use std::ops::Deref;

/// A numdict that permits explicit key assignment.
///
/// Shares the container semantics of [`NumDict`] (the whole read API is
/// available through `Deref`) but allows entries and the default to change
/// in place. Recording snapshots inputs by value, so mutating a
/// `MutableNumDict` after it was consumed by an operation cannot corrupt
/// the recorded computation.
///
/// # Example
///
/// ```
/// use numdicts::MutableNumDict;
///
/// let mut d = MutableNumDict::new();
/// d.insert("a", 0.2);
/// d.insert("a", 0.6);
/// d.set_default(Some(0.0));
/// let frozen = d.freeze();
/// assert_eq!(frozen.get(&"a").unwrap(), 0.6);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MutableNumDict<K: Key> {
    inner: NumDict<K>,
}

impl<K: Key> MutableNumDict<K> {
    /// Create an empty mutable numdict with no default.
    pub fn new() -> Self {
        Self {
            inner: NumDict::empty(),
        }
    }

    /// Create from key-value pairs and an optional default.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (K, f64)>, default: Option<f64>) -> Self {
        Self {
            inner: NumDict::from_pairs(pairs, default),
        }
    }

    /// Assign an explicit value, returning the previous one if any.
    pub fn insert(&mut self, key: K, value: f64) -> Option<f64> {
        self.inner.mapping_mut().insert(key, value)
    }

    /// Remove an explicit entry, returning its value if present.
    pub fn remove(&mut self, key: &K) -> Option<f64> {
        self.inner.mapping_mut().remove(key)
    }

    /// Replace the default value.
    pub fn set_default(&mut self, default: Option<f64>) {
        *self.inner.default_mut() = default;
    }

    /// Assign a batch of explicit entries.
    pub fn extend(&mut self, pairs: impl IntoIterator<Item = (K, f64)>) {
        self.inner.mapping_mut().extend(pairs);
    }

    /// Raise each explicit entry to at least the matching value in `other`,
    /// inserting entries for keys not yet present. Activation propagation
    /// uses this to pool incoming strengths keyed by construct.
    pub fn update_max(&mut self, other: &NumDict<K>) {
        let mapping = self.inner.mapping_mut();
        for (k, v) in other.iter() {
            mapping
                .entry(k.clone())
                .and_modify(|cur| *cur = cur.max(v))
                .or_insert(v);
        }
    }

    /// Convert into an immutable numdict.
    pub fn freeze(self) -> NumDict<K> {
        self.inner
    }
}

impl<K: Key> Default for MutableNumDict<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> Deref for MutableNumDict<K> {
    type Target = NumDict<K>;

    fn deref(&self) -> &NumDict<K> {
        &self.inner
    }
}

impl<K: Key> From<NumDict<K>> for MutableNumDict<K> {
    fn from(inner: NumDict<K>) -> Self {
        Self { inner }
    }
}

impl<K: Key> From<MutableNumDict<K>> for NumDict<K> {
    fn from(d: MutableNumDict<K>) -> Self {
        d.freeze()
    }
}
