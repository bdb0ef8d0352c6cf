//! Temperature-scaled softmax over a numdict's explicit entries.

use crate::autodiff::args::OpArgs;
use crate::autodiff::registry::{GradVec, OpId, Registry};
use crate::autodiff::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use smallvec::smallvec;
use std::collections::HashMap;

pub const BOLTZMANN: OpId = OpId("boltzmann");

/// Boltzmann distribution over the explicit entries at temperature `t`:
/// `out[k] = exp(v[k]/t) / sum_j exp(v[j]/t)`.
///
/// Computed in max-shifted form so large magnitudes cannot overflow the
/// exponentials. The output default is zero when the input has a default
/// (an unlisted key has vanishing probability mass), else `None`. An empty
/// input yields an empty distribution.
pub fn boltzmann<K: Key>(d: &TrackedDict<K>, t: f64) -> Result<TrackedDict<K>, NumDictError> {
    let default = d.value().default().map(|_| 0.0);
    let value = if d.value().is_empty() {
        NumDict::new(HashMap::new(), default)
    } else {
        let max = d.value().values().fold(f64::NEG_INFINITY, f64::max);
        let mut mapping: HashMap<K, f64> = d
            .value()
            .iter()
            .map(|(k, v)| (k.clone(), ((v - max) / t).exp()))
            .collect();
        let total: f64 = mapping.values().sum();
        for v in mapping.values_mut() {
            *v /= total;
        }
        NumDict::new(mapping, default)
    };
    d.tape()
        .record(BOLTZMANN, value, &[d], OpArgs::Boltzmann { t })
}

fn grad_boltzmann<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let t = args.as_temperature();
    let d = &inputs[0];
    if d.is_empty() {
        return Ok(smallvec![NumDict::empty()]);
    }

    // Recompute the forward distribution; snapshots store inputs, not
    // outputs.
    let max = d.values().fold(f64::NEG_INFINITY, f64::max);
    let probs: HashMap<&K, f64> = d.iter().map(|(k, v)| (k, ((v - max) / t).exp())).collect();
    let total: f64 = probs.values().sum();

    // Full softmax Jacobian-vector product, divided by the temperature:
    // d out[j] / d v[k] = out[k] * (delta_jk - out[j]) / t.
    let mut mapping = HashMap::with_capacity(d.len());
    for (k, _) in d.iter() {
        let p_k = probs[k] / total;
        let mut g = 0.0;
        for (j, _) in d.iter() {
            let p_j = probs[j] / total;
            let delta = if j == k { 1.0 } else { 0.0 };
            g += upstream.get(j)? * p_k * (delta - p_j);
        }
        mapping.insert(k.clone(), g / t);
    }
    Ok(smallvec![NumDict::new(mapping, None)])
}

pub(crate) fn install<K: Key>(registry: &mut Registry<K>) {
    registry.register_op(BOLTZMANN);
    registry
        .register_grad(BOLTZMANN, grad_boltzmann)
        .expect("the boltzmann op is registered before its gradient");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::backward::backward;
    use crate::autodiff::ops::{mul, reduce_sum};
    use crate::autodiff::tape::Tape;
    use approx::assert_relative_eq;

    #[test]
    fn test_boltzmann_normalizes() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs(
            [("a", 1.0), ("b", 2.0), ("c", 3.0)],
            None,
        ));
        let p = boltzmann(&d, 1.0).unwrap();
        let total: f64 = p.value().values().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        assert!(p.value().get(&"c").unwrap() > p.value().get(&"b").unwrap());
    }

    #[test]
    fn test_boltzmann_high_temperature_flattens() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], None));
        let p = boltzmann(&d, 1e6).unwrap();
        assert_relative_eq!(p.get(&"a").unwrap(), 0.5, epsilon = 1e-5);
        assert_relative_eq!(p.get(&"b").unwrap(), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_boltzmann_large_values_stay_finite() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1e4), ("b", 1e4 + 1.0)], None));
        let p = boltzmann(&d, 1.0).unwrap();
        assert!(p.get(&"a").unwrap().is_finite());
        let total: f64 = p.value().values().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boltzmann_default_handling() {
        let tape = Tape::new();
        let with = tape.leaf(NumDict::from_pairs([("a", 1.0)], Some(0.5)));
        assert_eq!(boltzmann(&with, 1.0).unwrap().value().default(), Some(0.0));

        let without = tape.leaf(NumDict::from_pairs([("a", 1.0)], None));
        assert_eq!(boltzmann(&without, 1.0).unwrap().value().default(), None);
    }

    #[test]
    fn test_boltzmann_empty_input() {
        let tape: Tape<&str> = Tape::new();
        let d = tape.leaf(NumDict::empty());
        let p = boltzmann(&d, 1.0).unwrap();
        assert!(p.is_empty());
        assert_eq!(p.value().default(), None);
        // The record still exists and backward traverses it cleanly.
        let total = reduce_sum(&p, None).unwrap();
        assert!(backward(&total).is_ok());
    }

    #[test]
    fn test_boltzmann_uniform_sum_has_zero_gradient() {
        // The probabilities sum to one identically, so the gradient of
        // their plain sum vanishes.
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 3.0)], None));
        let total = reduce_sum(&boltzmann(&d, 1.0).unwrap(), None).unwrap();
        let grads = backward(&total).unwrap();
        let g = grads.wrt(&d).unwrap();
        assert_relative_eq!(g.get(&"a").unwrap(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(g.get(&"b").unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_boltzmann_weighted_gradient() {
        // Weighting one probability isolates a single softmax Jacobian
        // row: d p_a / d v_a = p_a (1 - p_a) / t.
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], None));
        let w = tape.constant(NumDict::from_pairs([("a", 1.0), ("b", 0.0)], None));
        let total = reduce_sum(&mul(&boltzmann(&d, 1.0).unwrap(), &w).unwrap(), None).unwrap();
        let grads = backward(&total).unwrap();

        let p_a = 1.0f64.exp() / (1.0f64.exp() + 2.0f64.exp());
        let g = grads.wrt(&d).unwrap();
        assert_relative_eq!(g.get(&"a").unwrap(), p_a * (1.0 - p_a), epsilon = 1e-12);
        assert_relative_eq!(g.get(&"b").unwrap(), -p_a * (1.0 - p_a), epsilon = 1e-12);
    }
}
