//! TrackedDict - numdict with gradient tracking.

use super::ops;
use super::tape::{NodeId, Tape};
use crate::key::Key;
use crate::numdict::NumDict;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A numdict bound to a tape for automatic differentiation.
///
/// This is the main user-facing type of the autodiff layer. It pairs an
/// immutable [`NumDict`] with the tape it was produced on and, when the
/// value is differentiable, the node identifying it in the record log.
/// Values made by [`Tape::leaf`] are gradient targets; values made by
/// [`Tape::constant`] flow forward but receive no gradient.
///
/// # Example
///
/// ```
/// use numdicts::NumDict;
/// use numdicts::autodiff::{backward, ops, Tape};
///
/// let tape = Tape::new();
/// let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], None));
/// let doubled = &d + &d;
/// let total = ops::reduce_sum(&doubled, None).unwrap();
///
/// let grads = backward(&total).unwrap();
/// assert_eq!(grads.wrt(&d).unwrap().get(&"a").unwrap(), 2.0);
/// ```
#[derive(Debug, Clone)]
pub struct TrackedDict<K: Key> {
    value: NumDict<K>,
    node: Option<NodeId>,
    tape: Tape<K>,
}

impl<K: Key> TrackedDict<K> {
    pub(crate) fn from_parts(value: NumDict<K>, node: Option<NodeId>, tape: Tape<K>) -> Self {
        Self { value, node, tape }
    }

    /// The underlying numdict.
    pub fn value(&self) -> &NumDict<K> {
        &self.value
    }

    /// Consume and return the underlying numdict.
    pub fn into_value(self) -> NumDict<K> {
        self.value
    }

    /// The tape this value lives on.
    pub fn tape(&self) -> &Tape<K> {
        &self.tape
    }

    /// Node id, if this value is differentiable.
    pub fn node_id(&self) -> Option<NodeId> {
        self.node
    }

    /// Whether gradients can flow to this value.
    pub fn is_tracked(&self) -> bool {
        self.node.is_some()
    }

    /// Copy that shares the tape but receives no gradient.
    pub fn detach(&self) -> Self {
        Self {
            value: self.value.clone(),
            node: None,
            tape: self.tape.clone(),
        }
    }

    /// Point lookup on the underlying numdict.
    pub fn get(&self, key: &K) -> Result<f64, crate::NumDictError> {
        self.value.get(key)
    }

    /// Number of explicit entries in the underlying numdict.
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// Whether the underlying numdict has no explicit entries.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// The underlying numdict's default.
    pub fn default(&self) -> Option<f64> {
        self.value.default()
    }
}

// Arithmetic operators delegate to the recorded primitives so that anything
// written with them stays differentiable by composition. Operands must
// share a tape and cover the key union; the named functions in [`ops`]
// report those failures as values.

macro_rules! tracked_binop {
    ($trait:ident, $method:ident, $op:path) => {
        impl<'a, 'b, K: Key> $trait<&'b TrackedDict<K>> for &'a TrackedDict<K> {
            type Output = TrackedDict<K>;

            fn $method(self, other: &'b TrackedDict<K>) -> TrackedDict<K> {
                $op(self, other).expect("operands share a tape and cover the key union")
            }
        }

        impl<'a, K: Key> $trait<f64> for &'a TrackedDict<K> {
            type Output = TrackedDict<K>;

            fn $method(self, scalar: f64) -> TrackedDict<K> {
                $op(self, &self.tape().scalar(scalar))
                    .expect("scalar broadcast records on the operand's own tape")
            }
        }

        impl<'a, K: Key> $trait<&'a TrackedDict<K>> for f64 {
            type Output = TrackedDict<K>;

            fn $method(self, other: &'a TrackedDict<K>) -> TrackedDict<K> {
                $op(&other.tape().scalar(self), other)
                    .expect("scalar broadcast records on the operand's own tape")
            }
        }
    };
}

tracked_binop!(Add, add, ops::add);
tracked_binop!(Sub, sub, ops::sub);
tracked_binop!(Mul, mul, ops::mul);
tracked_binop!(Div, div, ops::div);

impl<'a, K: Key> Neg for &'a TrackedDict<K> {
    type Output = TrackedDict<K>;

    fn neg(self) -> TrackedDict<K> {
        ops::neg(self).expect("negation records on the operand's own tape")
    }
}
