//! Error types for numdicts.

use thiserror::Error;

/// Errors that can occur in numdict operations.
#[derive(Debug, Error)]
pub enum NumDictError {
    /// Key has no explicit entry and no default is defined.
    #[error("key {key} has no explicit value and no default is defined")]
    KeyNotFound { key: String },

    /// `merge` called with no operands.
    #[error("merge requires at least one operand")]
    EmptyMerge,

    /// `merge` operands share a key.
    #[error("merge operands are not disjoint: key {key} appears more than once")]
    NotDisjoint { key: String },

    /// A key filter was built with neither a predicate nor a key set.
    #[error("a key filter needs a predicate, a key set, or both")]
    MissingFilter,

    /// `transform_keys` given a key map that collides on the input's keys.
    #[error("key map must be one-to-one on the input's keys")]
    NonInjectiveKeyMap,

    /// Max/min reduction over an empty numdict.
    #[error("{op} requires a nonempty input")]
    EmptyReduction { op: &'static str },

    /// Operation was never registered.
    #[error("operation {op:?} is not registered")]
    UnregisteredOp { op: &'static str },

    /// Backward pass reached a record whose operation has no gradient rule.
    #[error("operation {op:?} has no registered gradient rule")]
    MissingGradRule { op: &'static str },

    /// Operands belong to different tapes.
    #[error("operands were recorded on different tapes")]
    TapeMismatch,

    /// Backward called on a value with no node in the tape.
    #[error("value is not tracked on any tape")]
    Untracked,
}
