//! NumDict - sparse key-addressed numeric map with an explicit default.

use crate::error::NumDictError;
use crate::key::Key;
use approx::relative_eq;
use std::collections::HashMap;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Relative tolerance used by [`NumDict::isclose`] and [`NumDict::all_close`].
pub const CLOSE_TOL: f64 = 1e-9;

/// A sparse map from keys to `f64` values with an optional default.
///
/// A `NumDict` is a partial function over an open-ended key universe: keys
/// with an explicit entry return that entry, every other key returns the
/// default. A default of `None` means "undefined here", and looking up an
/// absent key then fails.
///
/// Once constructed a `NumDict` never changes; see
/// [`MutableNumDict`](crate::MutableNumDict) for the in-place variant.
///
/// # Example
///
/// ```
/// use numdicts::NumDict;
///
/// let d = NumDict::from_pairs([("a", 1.0), ("b", 2.0)], Some(0.0));
/// assert_eq!(d.get(&"a").unwrap(), 1.0);
/// assert_eq!(d.get(&"z").unwrap(), 0.0); // falls back to the default
/// assert_eq!(d.len(), 2); // explicit entries only
/// ```
#[derive(Debug, Clone)]
pub struct NumDict<K: Key> {
    mapping: HashMap<K, f64>,
    default: Option<f64>,
}

impl<K: Key> NumDict<K> {
    /// Create a numdict from an explicit mapping and an optional default.
    pub fn new(mapping: HashMap<K, f64>, default: Option<f64>) -> Self {
        Self { mapping, default }
    }

    /// Create a numdict from key-value pairs and an optional default.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (K, f64)>, default: Option<f64>) -> Self {
        Self {
            mapping: pairs.into_iter().collect(),
            default,
        }
    }

    /// Create an empty numdict with no default.
    pub fn empty() -> Self {
        Self {
            mapping: HashMap::new(),
            default: None,
        }
    }

    /// Create a numdict with no explicit entries that answers `default`
    /// for every key. This is how scalars broadcast over key sets.
    pub fn from_default(default: f64) -> Self {
        Self {
            mapping: HashMap::new(),
            default: Some(default),
        }
    }

    /// Look up a key: explicit value, else default, else `KeyNotFound`.
    pub fn get(&self, key: &K) -> Result<f64, NumDictError> {
        self.lookup(key).ok_or_else(|| NumDictError::KeyNotFound {
            key: format!("{:?}", key),
        })
    }

    /// Look up a key without erroring: explicit value, else default.
    pub fn lookup(&self, key: &K) -> Option<f64> {
        self.mapping.get(key).copied().or(self.default)
    }

    /// The default value, if any.
    pub fn default(&self) -> Option<f64> {
        self.default
    }

    /// Whether the key has an explicit entry.
    pub fn contains_key(&self, key: &K) -> bool {
        self.mapping.contains_key(key)
    }

    /// Iterate over explicit keys only. Default-covered keys are not
    /// enumerated; the sparse key set is open-world.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.mapping.keys()
    }

    /// Iterate over explicit values only.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.mapping.values().copied()
    }

    /// Iterate over explicit entries only.
    pub fn iter(&self) -> impl Iterator<Item = (&K, f64)> {
        self.mapping.iter().map(|(k, v)| (k, *v))
    }

    /// Number of explicit entries.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    /// Whether there are no explicit entries.
    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Access the raw explicit mapping.
    pub fn mapping(&self) -> &HashMap<K, f64> {
        &self.mapping
    }

    // In-place access for the mutable variant; not part of the public
    // contract, which is immutable after construction.
    pub(crate) fn mapping_mut(&mut self) -> &mut HashMap<K, f64> {
        &mut self.mapping
    }

    pub(crate) fn default_mut(&mut self) -> &mut Option<f64> {
        &mut self.default
    }

    /// Copy of this numdict with a different default.
    pub fn with_default(&self, default: Option<f64>) -> Self {
        Self {
            mapping: self.mapping.clone(),
            default,
        }
    }

    /// Copy with the same explicit key set but every value replaced by `v`.
    ///
    /// A `Some` default is mirrored to `v`; a `None` default stays `None`.
    pub fn constant(&self, v: f64) -> Self {
        Self {
            mapping: self.mapping.keys().cloned().map(|k| (k, v)).collect(),
            default: self.default.map(|_| v),
        }
    }

    /// Apply `f` to every explicit value and to the default.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Self {
        Self {
            mapping: self.mapping.iter().map(|(k, v)| (k.clone(), f(*v))).collect(),
            default: self.default.map(|v| f(v)),
        }
    }

    /// Combine two numdicts pointwise over the union of their explicit keys.
    ///
    /// A key explicit on one side only reads the other side through its
    /// default; if that side has no default the combination fails. The
    /// result default is `f` of the two defaults when both are defined,
    /// else `None`.
    pub fn combine(&self, other: &Self, f: impl Fn(f64, f64) -> f64) -> Result<Self, NumDictError> {
        let mut mapping = HashMap::with_capacity(self.mapping.len() + other.mapping.len());
        for (k, v) in self.mapping.iter() {
            mapping.insert(k.clone(), f(*v, other.get(k)?));
        }
        for (k, v) in other.mapping.iter() {
            if !self.mapping.contains_key(k) {
                mapping.insert(k.clone(), f(self.get(k)?, *v));
            }
        }
        let default = match (self.default, other.default) {
            (Some(a), Some(b)) => Some(f(a, b)),
            _ => None,
        };
        Ok(Self { mapping, default })
    }

    /// Elementwise natural logarithm.
    pub fn ln(&self) -> Self {
        self.map(f64::ln)
    }

    /// Elementwise base-e exponential.
    pub fn exp(&self) -> Self {
        self.map(f64::exp)
    }

    /// Elementwise power with a scalar exponent.
    pub fn powf(&self, p: f64) -> Self {
        self.map(|v| v.powf(p))
    }

    /// Pointwise `self > other` indicator (1.0 / 0.0) over the key union.
    pub fn gt(&self, other: &Self) -> Result<Self, NumDictError> {
        self.combine(other, |a, b| (a > b) as u8 as f64)
    }

    /// Pointwise `self >= other` indicator over the key union.
    pub fn ge(&self, other: &Self) -> Result<Self, NumDictError> {
        self.combine(other, |a, b| (a >= b) as u8 as f64)
    }

    /// Pointwise `self < other` indicator over the key union.
    pub fn lt(&self, other: &Self) -> Result<Self, NumDictError> {
        self.combine(other, |a, b| (a < b) as u8 as f64)
    }

    /// Pointwise `self <= other` indicator over the key union.
    pub fn le(&self, other: &Self) -> Result<Self, NumDictError> {
        self.combine(other, |a, b| (a <= b) as u8 as f64)
    }

    /// Pointwise approximate-equality indicator over the key union.
    ///
    /// Near-ties count as equal within [`CLOSE_TOL`] relative tolerance,
    /// which is what lets max/min gradients share credit between nearly
    /// tied entries.
    pub fn isclose(&self, other: &Self) -> Result<Self, NumDictError> {
        self.combine(other, |a, b| {
            relative_eq!(a, b, max_relative = CLOSE_TOL) as u8 as f64
        })
    }

    /// Whether every value over the key union is approximately equal,
    /// including the defaults when both are defined. Numdicts whose
    /// defaults differ in presence are never all-close.
    pub fn all_close(&self, other: &Self) -> bool {
        match (self.default, other.default) {
            (Some(a), Some(b)) if !relative_eq!(a, b, max_relative = CLOSE_TOL) => return false,
            (Some(_), None) | (None, Some(_)) => {
                // Defaults of unequal presence only matter if some union key
                // would have to read through the missing one.
            }
            _ => {}
        }
        let close_at = |k: &K| match (self.lookup(k), other.lookup(k)) {
            (Some(a), Some(b)) => relative_eq!(a, b, max_relative = CLOSE_TOL),
            _ => false,
        };
        self.mapping.keys().all(&close_at) && other.mapping.keys().all(&close_at)
    }
}

impl<K: Key> Default for NumDict<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: Key> PartialEq for NumDict<K> {
    /// Equality over explicit entries and the default, insensitive to key
    /// insertion order.
    fn eq(&self, other: &Self) -> bool {
        self.default == other.default && self.mapping == other.mapping
    }
}

impl<K: Key> FromIterator<(K, f64)> for NumDict<K> {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self::from_pairs(iter, None)
    }
}

// Operator sugar over `combine`. Use `combine` directly when coverage is
// not guaranteed and the failure should be a value.
macro_rules! numdict_binop {
    ($trait:ident, $method:ident, $f:expr) => {
        impl<'a, 'b, K: Key> $trait<&'b NumDict<K>> for &'a NumDict<K> {
            type Output = NumDict<K>;

            /// # Panics
            ///
            /// Panics if either operand has an explicit key the other can
            /// neither match nor answer through its default; see
            /// [`NumDict::combine`] for the fallible form.
            fn $method(self, other: &'b NumDict<K>) -> NumDict<K> {
                self.combine(other, $f)
                    .expect("elementwise operands must cover the key union")
            }
        }

        impl<'a, K: Key> $trait<f64> for &'a NumDict<K> {
            type Output = NumDict<K>;

            // A scalar broadcasts as a pure default, so coverage holds for
            // any key and the combine cannot fail.
            fn $method(self, scalar: f64) -> NumDict<K> {
                self.combine(&NumDict::from_default(scalar), $f)
                    .expect("scalar broadcast cannot fail on the key union")
            }
        }

        impl<'a, K: Key> $trait<&'a NumDict<K>> for f64 {
            type Output = NumDict<K>;

            fn $method(self, other: &'a NumDict<K>) -> NumDict<K> {
                NumDict::from_default(self)
                    .combine(other, $f)
                    .expect("scalar broadcast cannot fail on the key union")
            }
        }
    };
}

numdict_binop!(Add, add, |a, b| a + b);
numdict_binop!(Sub, sub, |a, b| a - b);
numdict_binop!(Mul, mul, |a, b| a * b);
numdict_binop!(Div, div, |a, b| a / b);

impl<'a, K: Key> Neg for &'a NumDict<K> {
    type Output = NumDict<K>;

    fn neg(self) -> NumDict<K> {
        self.map(|v| -v)
    }
}
