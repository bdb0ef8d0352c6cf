//! Operation/gradient registry.
//!
//! Differentiable primitives are identified by an [`OpId`] and associated
//! with a backward rule in an explicit table built at startup. Callers can
//! extend the table with their own primitives through [`Registry::register_op`]
//! and [`Registry::register_grad`] before handing the registry to a tape.

use super::args::OpArgs;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifier of a differentiable primitive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(pub &'static str);

impl OpId {
    /// The operation's name.
    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Per-input gradients returned by a backward rule, one per positional
/// input, in the same order. Nearly all primitives have one or two inputs.
pub type GradVec<K> = SmallVec<[NumDict<K>; 2]>;

/// A backward rule: pure function from the upstream gradient, the original
/// input snapshots, and the original keyword arguments to one gradient per
/// input.
pub type GradRule<K> =
    Arc<dyn Fn(&NumDict<K>, &[NumDict<K>], &OpArgs<K>) -> Result<GradVec<K>, NumDictError>>;

/// Table associating each differentiable operation with its backward rule.
///
/// Caller-owned: build one (usually [`Registry::with_builtins`]), extend it
/// if needed, and hand it to a [`Tape`](super::Tape).
///
/// # Example
///
/// ```ignore
/// use numdicts::autodiff::{GradVec, OpArgs, OpId, Registry};
/// use smallvec::smallvec;
///
/// const SQUARE: OpId = OpId("square");
///
/// let mut registry = Registry::<&str>::with_builtins();
/// registry.register_op(SQUARE);
/// registry.register_grad(SQUARE, |upstream, inputs, _args| {
///     let d = &inputs[0];
///     Ok(smallvec![upstream.combine(d, |g, x| 2.0 * g * x)?])
/// })?;
/// ```
pub struct Registry<K: Key> {
    rules: HashMap<OpId, Option<GradRule<K>>>,
}

impl<K: Key> Registry<K> {
    /// Create an empty registry with no operations.
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Create a registry with the whole builtin operation library installed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        super::ops::install_builtins(&mut registry);
        registry
    }

    /// Mark an operation as a differentiable primitive.
    ///
    /// Idempotent; an already-attached gradient rule is kept.
    pub fn register_op(&mut self, op: OpId) {
        self.rules.entry(op).or_insert(None);
    }

    /// Attach a backward rule to a previously registered operation.
    ///
    /// Fails with [`NumDictError::UnregisteredOp`] if `op` was never passed
    /// to [`register_op`](Self::register_op).
    pub fn register_grad<F>(&mut self, op: OpId, rule: F) -> Result<(), NumDictError>
    where
        F: Fn(&NumDict<K>, &[NumDict<K>], &OpArgs<K>) -> Result<GradVec<K>, NumDictError>
            + 'static,
    {
        match self.rules.get_mut(&op) {
            Some(slot) => {
                *slot = Some(Arc::new(rule));
                Ok(())
            }
            None => Err(NumDictError::UnregisteredOp { op: op.name() }),
        }
    }

    /// Whether the operation is registered.
    pub fn is_registered(&self, op: OpId) -> bool {
        self.rules.contains_key(&op)
    }

    /// The backward rule for an operation, if one is attached.
    pub fn rule(&self, op: OpId) -> Option<GradRule<K>> {
        self.rules.get(&op).and_then(|slot| slot.clone())
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no operations are registered.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl<K: Key> Default for Registry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> fmt::Debug for Registry<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("num_ops", &self.rules.len())
            .finish()
    }
}
