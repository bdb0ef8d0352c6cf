//! Operation argument payloads stored on tape records.

use crate::key::Key;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Key-remapping capability used by `set_by`, `transform_keys`, and the
/// grouping reductions.
pub struct KeyMap<K: Key> {
    func: Arc<dyn Fn(&K) -> K>,
}

impl<K: Key> KeyMap<K> {
    /// Wrap a key-mapping function.
    pub fn new(func: impl Fn(&K) -> K + 'static) -> Self {
        Self {
            func: Arc::new(func),
        }
    }

    /// Apply the map to a key.
    pub fn map(&self, key: &K) -> K {
        (self.func)(key)
    }
}

impl<K: Key> Clone for KeyMap<K> {
    fn clone(&self) -> Self {
        Self {
            func: Arc::clone(&self.func),
        }
    }
}

impl<K: Key> fmt::Debug for KeyMap<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyMap(..)")
    }
}

/// Filtering policy for `keep` and `drop`: a predicate, an explicit key
/// set, or both. Building one with neither is a configuration error, which
/// the op constructors surface as
/// [`MissingFilter`](crate::NumDictError::MissingFilter).
pub struct KeyFilter<K: Key> {
    predicate: Option<Arc<dyn Fn(&K) -> bool>>,
    keys: Option<HashSet<K>>,
}

impl<K: Key> KeyFilter<K> {
    /// Filter by predicate only.
    pub fn predicate(func: impl Fn(&K) -> bool + 'static) -> Self {
        Self {
            predicate: Some(Arc::new(func)),
            keys: None,
        }
    }

    /// Filter by explicit key set only.
    pub fn keys(keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            predicate: None,
            keys: Some(keys.into_iter().collect()),
        }
    }

    /// Filter by both a predicate and a key set.
    pub fn both(func: impl Fn(&K) -> bool + 'static, keys: impl IntoIterator<Item = K>) -> Self {
        Self {
            predicate: Some(Arc::new(func)),
            keys: Some(keys.into_iter().collect()),
        }
    }

    /// Assemble a filter from optional criteria, e.g. out of configuration
    /// where either may be absent. A filter with neither criterion is
    /// rejected by the filtering operations.
    pub fn from_parts(
        predicate: Option<impl Fn(&K) -> bool + 'static>,
        keys: Option<impl IntoIterator<Item = K>>,
    ) -> Self {
        Self {
            predicate: predicate.map(|f| Arc::new(f) as Arc<dyn Fn(&K) -> bool>),
            keys: keys.map(|ks| ks.into_iter().collect()),
        }
    }

    /// Whether neither a predicate nor a key set was supplied.
    pub(crate) fn is_vacuous(&self) -> bool {
        self.predicate.is_none() && self.keys.is_none()
    }

    /// `keep` membership: the predicate holds OR the key is in the set.
    pub fn matches(&self, key: &K) -> bool {
        self.predicate.as_ref().map_or(false, |f| f(key))
            || self.keys.as_ref().map_or(false, |s| s.contains(key))
    }

    /// `drop` retention: the predicate rejects AND the key is outside the
    /// set. With only one criterion supplied this retains nothing; that
    /// asymmetry with [`matches`](Self::matches) is deliberate and pinned
    /// by tests.
    pub fn retains_on_drop(&self, key: &K) -> bool {
        self.predicate.as_ref().map_or(false, |f| !f(key))
            && self.keys.as_ref().map_or(false, |s| !s.contains(key))
    }
}

impl<K: Key> Clone for KeyFilter<K> {
    fn clone(&self) -> Self {
        Self {
            predicate: self.predicate.as_ref().map(Arc::clone),
            keys: self.keys.clone(),
        }
    }
}

impl<K: Key> fmt::Debug for KeyFilter<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFilter")
            .field("predicate", &self.predicate.as_ref().map(|_| ".."))
            .field("keys", &self.keys)
            .finish()
    }
}

/// Keyword configuration of a recorded operation, replayed verbatim to the
/// operation's gradient rule during the backward pass.
#[derive(Debug, Clone)]
pub enum OpArgs<K: Key> {
    /// No configuration.
    None,
    /// A scalar parameter (e.g. a power exponent).
    Scalar { value: f64 },
    /// Threshold level and default retention.
    Threshold { th: f64, keep_default: bool },
    /// Clamp bounds.
    Clip { low: f64, high: f64 },
    /// Optional key addressing a scalar reduction result.
    Reduce { key: Option<K> },
    /// Softmax temperature.
    Boltzmann { t: f64 },
    /// Filtering policy for keep/drop.
    Filter(KeyFilter<K>),
    /// Key-remapping function.
    MapKeys(KeyMap<K>),
}

impl<K: Key> OpArgs<K> {
    pub(crate) fn as_scalar(&self) -> f64 {
        match self {
            OpArgs::Scalar { value } => *value,
            _ => panic!("record carries Scalar args for this operation"),
        }
    }

    pub(crate) fn as_threshold(&self) -> (f64, bool) {
        match self {
            OpArgs::Threshold { th, keep_default } => (*th, *keep_default),
            _ => panic!("record carries Threshold args for this operation"),
        }
    }

    pub(crate) fn as_clip(&self) -> (f64, f64) {
        match self {
            OpArgs::Clip { low, high } => (*low, *high),
            _ => panic!("record carries Clip args for this operation"),
        }
    }

    pub(crate) fn as_reduce_key(&self) -> Option<&K> {
        match self {
            OpArgs::Reduce { key } => key.as_ref(),
            _ => panic!("record carries Reduce args for this operation"),
        }
    }

    pub(crate) fn as_temperature(&self) -> f64 {
        match self {
            OpArgs::Boltzmann { t } => *t,
            _ => panic!("record carries Boltzmann args for this operation"),
        }
    }

    pub(crate) fn as_filter(&self) -> &KeyFilter<K> {
        match self {
            OpArgs::Filter(filter) => filter,
            _ => panic!("record carries Filter args for this operation"),
        }
    }

    pub(crate) fn as_keymap(&self) -> &KeyMap<K> {
        match self {
            OpArgs::MapKeys(map) => map,
            _ => panic!("record carries MapKeys args for this operation"),
        }
    }
}
