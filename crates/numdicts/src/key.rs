//! Key bound for numdict entries.

use std::fmt::Debug;
use std::hash::Hash;

/// Types admissible as numdict keys.
///
/// The key universe is open-ended: the surrounding layer supplies its own
/// symbol types (chunks, features, rule identifiers) and anything that is
/// cloneable, hashable, and debuggable qualifies via the blanket impl.
pub trait Key: Clone + Eq + Hash + Debug + 'static {}

impl<T: Clone + Eq + Hash + Debug + 'static> Key for T {}
