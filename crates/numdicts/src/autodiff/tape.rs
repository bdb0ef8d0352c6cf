//! Tape of recorded operation invocations.
//!
//! The tape is the dependency log for reverse-mode differentiation: every
//! primitive appends one record per forward evaluation, and the backward
//! engine replays the records in reverse creation order. A tape is a
//! caller-owned handle scoped to one forward+backward computation; dropping
//! it discards all records, so independent computations on separate tapes
//! never interleave and stale records never accumulate.

use super::args::OpArgs;
use super::registry::{OpId, Registry};
use super::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Unique identifier of a node (one tracked numdict) on a tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

impl NodeId {
    /// Get the internal index.
    pub fn index(&self) -> usize {
        self.0
    }

    /// Create a NodeId for testing purposes.
    #[cfg(test)]
    pub(crate) fn new_for_test(index: usize) -> Self {
        Self(index)
    }
}

/// One recorded input: a value snapshot plus the node it came from, if the
/// value was tracked. Snapshots are taken eagerly, so later mutation of a
/// source cannot change what the backward pass sees.
#[derive(Debug, Clone)]
pub(crate) struct TapeInput<K: Key> {
    pub(crate) node: Option<NodeId>,
    pub(crate) value: NumDict<K>,
}

/// One recorded operation invocation: the op, the output's node, the input
/// snapshots, and the keyword arguments the forward pass was called with.
#[derive(Debug, Clone)]
pub(crate) struct TapeRecord<K: Key> {
    pub(crate) op: OpId,
    pub(crate) output: NodeId,
    pub(crate) inputs: SmallVec<[TapeInput<K>; 2]>,
    pub(crate) args: OpArgs<K>,
}

pub(crate) struct TapeInner<K: Key> {
    pub(crate) records: Vec<TapeRecord<K>>,
    pub(crate) registry: Registry<K>,
    next_id: usize,
}

impl<K: Key> TapeInner<K> {
    fn fresh_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }
}

/// Caller-owned recording handle for one differentiable computation.
///
/// Cloning a `Tape` is cheap and yields a handle to the same record log;
/// tracked values carry such a clone so that operators can record without
/// any process-wide state.
///
/// # Example
///
/// ```
/// use numdicts::NumDict;
/// use numdicts::autodiff::{backward, ops, Tape};
///
/// let tape = Tape::new();
/// let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], None));
/// let y = ops::exp(&d).unwrap();
/// let total = ops::reduce_sum(&y, None).unwrap();
///
/// let grads = backward(&total).unwrap();
/// assert!(grads.wrt(&d).is_some());
/// ```
pub struct Tape<K: Key> {
    pub(crate) inner: Rc<RefCell<TapeInner<K>>>,
}

impl<K: Key> Tape<K> {
    /// Create a tape with the builtin operation library registered.
    pub fn new() -> Self {
        Self::with_registry(Registry::with_builtins())
    }

    /// Create a tape with a caller-assembled registry.
    pub fn with_registry(registry: Registry<K>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(TapeInner {
                records: Vec::new(),
                registry,
                next_id: 0,
            })),
        }
    }

    /// Track a numdict as a differentiable input (a graph leaf).
    pub fn leaf(&self, value: NumDict<K>) -> TrackedDict<K> {
        let node = self.inner.borrow_mut().fresh_id();
        TrackedDict::from_parts(value, Some(node), self.clone())
    }

    /// Wrap a numdict as an untracked constant: it participates in forward
    /// computation but no gradient flows to it.
    pub fn constant(&self, value: NumDict<K>) -> TrackedDict<K> {
        TrackedDict::from_parts(value, None, self.clone())
    }

    /// Wrap a scalar as an untracked constant that broadcasts over any key
    /// set (an empty mapping whose default is the scalar).
    pub fn scalar(&self, value: f64) -> TrackedDict<K> {
        self.constant(NumDict::from_default(value))
    }

    /// Append a record for one primitive invocation and return the tracked
    /// output.
    ///
    /// Called by every primitive exactly once per forward evaluation, after
    /// computing the result. Operations composed purely from other
    /// primitives must not call this themselves: their constituents already
    /// record, and a second record would double-count during the backward
    /// walk.
    ///
    /// Fails if `op` is not registered on this tape's registry or if any
    /// input belongs to a different tape.
    pub fn record(
        &self,
        op: OpId,
        output: NumDict<K>,
        inputs: &[&TrackedDict<K>],
        args: OpArgs<K>,
    ) -> Result<TrackedDict<K>, NumDictError> {
        for input in inputs {
            if !Rc::ptr_eq(&self.inner, &input.tape().inner) {
                return Err(NumDictError::TapeMismatch);
            }
        }
        let mut inner = self.inner.borrow_mut();
        if !inner.registry.is_registered(op) {
            return Err(NumDictError::UnregisteredOp { op: op.name() });
        }
        let node = inner.fresh_id();
        inner.records.push(TapeRecord {
            op,
            output: node,
            inputs: inputs
                .iter()
                .map(|d| TapeInput {
                    node: d.node_id(),
                    value: d.value().clone(),
                })
                .collect(),
            args,
        });
        drop(inner);
        Ok(TrackedDict::from_parts(output, Some(node), self.clone()))
    }

    /// Mark an operation as a primitive on this tape's registry.
    pub fn register_op(&self, op: OpId) {
        self.inner.borrow_mut().registry.register_op(op);
    }

    /// Attach a backward rule on this tape's registry; fails if `op` was
    /// never registered.
    pub fn register_grad<F>(&self, op: OpId, rule: F) -> Result<(), NumDictError>
    where
        F: Fn(
                &NumDict<K>,
                &[NumDict<K>],
                &OpArgs<K>,
            ) -> Result<super::registry::GradVec<K>, NumDictError>
            + 'static,
    {
        self.inner.borrow_mut().registry.register_grad(op, rule)
    }

    /// Number of records on the tape.
    pub fn len(&self) -> usize {
        self.inner.borrow().records.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.inner.borrow().records.is_empty()
    }

    /// Discard all records and node ids.
    ///
    /// Outstanding tracked values from before the clear become stale; use
    /// this only between independent computations, or simply drop the tape.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.records.clear();
        inner.next_id = 0;
    }
}

impl<K: Key> Clone for Tape<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K: Key> Default for Tape<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> fmt::Debug for Tape<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Tape")
            .field("num_records", &inner.records.len())
            .field("next_id", &inner.next_id)
            .finish()
    }
}
