//! Reductions from a numdict to a single scalar result.
//!
//! Reductions fold the explicit entries only; defaults never contribute.
//! The scalar result is re-expressed as a numdict: addressed under a caller
//! supplied key, or broadcast as a pure default when no key is given.

use crate::autodiff::args::OpArgs;
use crate::autodiff::registry::{GradVec, OpId, Registry};
use crate::autodiff::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use smallvec::smallvec;

pub const REDUCE_SUM: OpId = OpId("reduce_sum");
pub const REDUCE_MAX: OpId = OpId("reduce_max");
pub const REDUCE_MIN: OpId = OpId("reduce_min");

fn scalar_result<K: Key>(total: f64, key: Option<&K>) -> NumDict<K> {
    match key {
        Some(k) => NumDict::from_pairs([(k.clone(), total)], None),
        None => NumDict::from_default(total),
    }
}

/// Sum of all explicit values; an empty numdict sums to zero.
pub fn reduce_sum<K: Key>(
    d: &TrackedDict<K>,
    key: Option<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    let total: f64 = d.value().values().sum();
    let value = scalar_result(total, key.as_ref());
    d.tape()
        .record(REDUCE_SUM, value, &[d], OpArgs::Reduce { key })
}

/// Maximum of all explicit values; fails on an empty numdict.
pub fn reduce_max<K: Key>(
    d: &TrackedDict<K>,
    key: Option<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    if d.value().is_empty() {
        return Err(NumDictError::EmptyReduction { op: "reduce_max" });
    }
    let total = d.value().values().fold(f64::NEG_INFINITY, f64::max);
    let value = scalar_result(total, key.as_ref());
    d.tape()
        .record(REDUCE_MAX, value, &[d], OpArgs::Reduce { key })
}

/// Minimum of all explicit values; fails on an empty numdict.
pub fn reduce_min<K: Key>(
    d: &TrackedDict<K>,
    key: Option<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    if d.value().is_empty() {
        return Err(NumDictError::EmptyReduction { op: "reduce_min" });
    }
    let total = d.value().values().fold(f64::INFINITY, f64::min);
    let value = scalar_result(total, key.as_ref());
    d.tape()
        .record(REDUCE_MIN, value, &[d], OpArgs::Reduce { key })
}

/// Read the scalar upstream gradient back out of the reduction result's
/// addressing: the named key's entry, or the broadcast default.
fn upstream_scalar<K: Key>(
    upstream: &NumDict<K>,
    key: Option<&K>,
) -> Result<f64, NumDictError> {
    match key {
        Some(k) => upstream.get(k),
        None => upstream.default().ok_or_else(|| NumDictError::KeyNotFound {
            key: "<default>".to_string(),
        }),
    }
}

fn grad_sum<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let g = upstream_scalar(upstream, args.as_reduce_key())?;
    Ok(smallvec![inputs[0].constant(g)])
}

// Max and min share credit among (near-)tied extremal entries instead of
// picking one winner, so the gradient is continuous under small
// perturbations of a tie.
fn grad_extremum<K: Key>(
    upstream: &NumDict<K>,
    d: &NumDict<K>,
    key: Option<&K>,
    fold: impl Fn(f64, f64) -> f64,
    init: f64,
) -> Result<GradVec<K>, NumDictError> {
    let g = upstream_scalar(upstream, key)?;
    let extreme = d.values().fold(init, fold);
    let indicator = d.isclose(&NumDict::from_default(extreme))?;
    Ok(smallvec![indicator.map(|x| x * g)])
}

fn grad_max<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    grad_extremum(
        upstream,
        &inputs[0],
        args.as_reduce_key(),
        f64::max,
        f64::NEG_INFINITY,
    )
}

fn grad_min<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    grad_extremum(
        upstream,
        &inputs[0],
        args.as_reduce_key(),
        f64::min,
        f64::INFINITY,
    )
}

pub(crate) fn install<K: Key>(registry: &mut Registry<K>) {
    registry.register_op(REDUCE_SUM);
    registry.register_op(REDUCE_MAX);
    registry.register_op(REDUCE_MIN);
    registry
        .register_grad(REDUCE_SUM, grad_sum)
        .and_then(|_| registry.register_grad(REDUCE_MAX, grad_max))
        .and_then(|_| registry.register_grad(REDUCE_MIN, grad_min))
        .expect("builtin reductions are registered before their gradients");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::backward::backward;
    use crate::autodiff::tape::Tape;
    use approx::assert_relative_eq;

    #[test]
    fn test_reduce_sum_broadcast_result() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], Some(9.0)));
        let total = reduce_sum(&d, None).unwrap();
        // Defaults do not contribute to the fold.
        assert_eq!(total.value().default(), Some(3.0));
        assert!(total.value().is_empty());
    }

    #[test]
    fn test_reduce_sum_keyed_result() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], None));
        let total = reduce_sum(&d, Some("total")).unwrap();
        assert_eq!(total.get(&"total").unwrap(), 3.0);
        assert_eq!(total.value().default(), None);
    }

    #[test]
    fn test_reduce_sum_empty_is_zero() {
        let tape: Tape<&str> = Tape::new();
        let d = tape.leaf(NumDict::empty());
        let total = reduce_sum(&d, None).unwrap();
        assert_eq!(total.value().default(), Some(0.0));
    }

    #[test]
    fn test_reduce_sum_gradient_is_ones() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], None));
        let total = reduce_sum(&d, None).unwrap();
        let grads = backward(&total).unwrap();
        let g = grads.wrt(&d).unwrap();
        assert_eq!(g.get(&"a").unwrap(), 1.0);
        assert_eq!(g.get(&"b").unwrap(), 1.0);
    }

    #[test]
    fn test_reduce_max_value_and_gradient() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs(
            [("a", 1.0), ("b", 2.0), ("c", 3.0)],
            None,
        ));
        let top = reduce_max(&d, None).unwrap();
        assert_eq!(top.value().default(), Some(3.0));

        let grads = backward(&top).unwrap();
        let g = grads.wrt(&d).unwrap();
        assert_eq!(g.get(&"a").unwrap(), 0.0);
        assert_eq!(g.get(&"b").unwrap(), 0.0);
        assert_eq!(g.get(&"c").unwrap(), 1.0);
    }

    #[test]
    fn test_reduce_max_ties_share_credit() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 5.0), ("b", 5.0)], None));
        let top = reduce_max(&d, None).unwrap();
        let grads = backward(&top).unwrap();
        let g = grads.wrt(&d).unwrap();
        assert_eq!(g.get(&"a").unwrap(), 1.0);
        assert_eq!(g.get(&"b").unwrap(), 1.0);
    }

    #[test]
    fn test_reduce_min_gradient() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", -1.0), ("b", 2.0)], None));
        let bottom = reduce_min(&d, Some("min")).unwrap();
        assert_eq!(bottom.get(&"min").unwrap(), -1.0);

        let grads = backward(&bottom).unwrap();
        let g = grads.wrt(&d).unwrap();
        assert_relative_eq!(g.get(&"a").unwrap(), 1.0);
        assert_relative_eq!(g.get(&"b").unwrap(), 0.0);
    }

    #[test]
    fn test_extremum_of_empty_fails() {
        let tape: Tape<&str> = Tape::new();
        let d = tape.leaf(NumDict::empty());
        assert!(matches!(
            reduce_max(&d, None),
            Err(NumDictError::EmptyReduction { op: "reduce_max" })
        ));
        assert!(matches!(
            reduce_min(&d, None),
            Err(NumDictError::EmptyReduction { op: "reduce_min" })
        ));
    }
}
