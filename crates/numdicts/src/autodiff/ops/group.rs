//! Merging, key rewiring, and grouped reductions.

use super::reduce::{reduce_max, reduce_min, reduce_sum};
use crate::autodiff::args::{KeyFilter, KeyMap, OpArgs};
use crate::autodiff::registry::{GradVec, OpId, Registry};
use crate::autodiff::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

pub const MERGE: OpId = OpId("merge");
pub const SET_BY: OpId = OpId("set_by");
pub const TRANSFORM_KEYS: OpId = OpId("transform_keys");

/// Disjoint union of any number of numdicts.
///
/// Fails on an empty operand list, and on any explicit key appearing in
/// more than one operand. The output default is the operands' common
/// default when they all agree, else `None`.
pub fn merge<K: Key>(inputs: &[&TrackedDict<K>]) -> Result<TrackedDict<K>, NumDictError> {
    let first = inputs.first().ok_or(NumDictError::EmptyMerge)?;

    let mut mapping: HashMap<K, f64> = HashMap::new();
    for d in inputs {
        for (k, v) in d.value().iter() {
            if mapping.insert(k.clone(), v).is_some() {
                return Err(NumDictError::NotDisjoint {
                    key: format!("{:?}", k),
                });
            }
        }
    }
    let common = first.value().default();
    let default = if inputs.iter().all(|d| d.value().default() == common) {
        common
    } else {
        None
    };

    first
        .tape()
        .record(MERGE, NumDict::new(mapping, default), inputs, OpArgs::None)
}

/// Rebuild the target's entries by reading the source through a key map:
/// `out[k] = source[f(k)]` for every explicit key `k` of `target`.
///
/// The target contributes its key set only, so it receives a zero
/// gradient; all sensitivity flows to the source.
pub fn set_by<K: Key>(
    target: &TrackedDict<K>,
    source: &TrackedDict<K>,
    keyfunc: &KeyMap<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    let mut mapping = HashMap::with_capacity(target.len());
    for (k, _) in target.value().iter() {
        mapping.insert(k.clone(), source.value().get(&keyfunc.map(k))?);
    }
    target.tape().record(
        SET_BY,
        NumDict::new(mapping, None),
        &[target, source],
        OpArgs::MapKeys(keyfunc.clone()),
    )
}

/// Rename every explicit key through a key map, keeping values and default.
///
/// Fails if the map collapses two keys into one.
pub fn transform_keys<K: Key>(
    d: &TrackedDict<K>,
    keyfunc: &KeyMap<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    let mapping: HashMap<K, f64> = d
        .value()
        .iter()
        .map(|(k, v)| (keyfunc.map(k), v))
        .collect();
    if mapping.len() != d.len() {
        return Err(NumDictError::NonInjectiveKeyMap);
    }
    d.tape().record(
        TRANSFORM_KEYS,
        NumDict::new(mapping, d.value().default()),
        &[d],
        OpArgs::MapKeys(keyfunc.clone()),
    )
}

/// Sum a numdict's entries into buckets addressed by the mapped key.
pub(crate) fn group_sum<K: Key>(d: &NumDict<K>, keyfunc: &KeyMap<K>) -> NumDict<K> {
    let mut mapping: HashMap<K, f64> = HashMap::new();
    for (k, v) in d.iter() {
        *mapping.entry(keyfunc.map(k)).or_insert(0.0) += v;
    }
    NumDict::new(mapping, None)
}

fn grad_merge<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    _args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let mut grads = SmallVec::with_capacity(inputs.len());
    for d in inputs {
        let mut mapping = HashMap::with_capacity(d.len());
        for (k, _) in d.iter() {
            mapping.insert(k.clone(), upstream.get(k)?);
        }
        grads.push(NumDict::new(mapping, upstream.default()));
    }
    Ok(grads)
}

fn grad_set_by<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let keyfunc = args.as_keymap();
    let target = &inputs[0];
    // Entries of the source read by several target keys accumulate all of
    // their readers' upstream contributions.
    Ok(smallvec::smallvec![
        target.constant(0.0),
        group_sum(upstream, keyfunc),
    ])
}

fn grad_transform_keys<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let keyfunc = args.as_keymap();
    let d = &inputs[0];
    // The gradient is addressed under the transformed keys, matching the
    // output's key space rather than the input's.
    let mut mapping = HashMap::with_capacity(d.len());
    for (k, _) in d.iter() {
        let mapped = keyfunc.map(k);
        let g = upstream.get(&mapped)?;
        mapping.insert(mapped, g);
    }
    Ok(smallvec::smallvec![NumDict::new(
        mapping,
        upstream.default()
    )])
}

/// Partition a numdict's explicit keys by a key map and reduce each group
/// independently, merging the per-group results.
///
/// `reducer` receives each group as a tracked sub-dict along with the
/// group's shared mapped key, and must return a result keyed disjointly
/// from the other groups. Composed from recorded primitives.
pub fn by<K: Key>(
    d: &TrackedDict<K>,
    keyfunc: &KeyMap<K>,
    reducer: impl Fn(&TrackedDict<K>, K) -> Result<TrackedDict<K>, NumDictError>,
) -> Result<TrackedDict<K>, NumDictError> {
    let mut groups: HashMap<K, HashSet<K>> = HashMap::new();
    for (k, _) in d.value().iter() {
        groups.entry(keyfunc.map(k)).or_default().insert(k.clone());
    }

    let mut reduced = Vec::with_capacity(groups.len());
    for (group_key, members) in groups {
        let part = super::filter::keep(d, KeyFilter::keys(members))?;
        reduced.push(reducer(&part, group_key)?);
    }
    let refs: Vec<&TrackedDict<K>> = reduced.iter().collect();
    merge(&refs)
}

/// Sum each group of entries sharing a mapped key.
pub fn sum_by<K: Key>(
    d: &TrackedDict<K>,
    keyfunc: &KeyMap<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    by(d, keyfunc, |part, k| reduce_sum(part, Some(k)))
}

/// Maximum within each group of entries sharing a mapped key.
pub fn max_by<K: Key>(
    d: &TrackedDict<K>,
    keyfunc: &KeyMap<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    by(d, keyfunc, |part, k| reduce_max(part, Some(k)))
}

/// Minimum within each group of entries sharing a mapped key.
pub fn min_by<K: Key>(
    d: &TrackedDict<K>,
    keyfunc: &KeyMap<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    by(d, keyfunc, |part, k| reduce_min(part, Some(k)))
}

pub(crate) fn install<K: Key>(registry: &mut Registry<K>) {
    registry.register_op(MERGE);
    registry.register_op(SET_BY);
    registry.register_op(TRANSFORM_KEYS);
    registry
        .register_grad(MERGE, grad_merge)
        .and_then(|_| registry.register_grad(SET_BY, grad_set_by))
        .and_then(|_| registry.register_grad(TRANSFORM_KEYS, grad_transform_keys))
        .expect("builtin grouping ops are registered before their gradients");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autodiff::backward::backward;
    use crate::autodiff::tape::Tape;
    use approx::assert_relative_eq;

    #[test]
    fn test_merge_disjoint_union() {
        let tape = Tape::new();
        let a = tape.leaf(NumDict::from_pairs([("a", 1.0)], Some(0.0)));
        let b = tape.leaf(NumDict::from_pairs([("b", 2.0)], Some(0.0)));
        let merged = merge(&[&a, &b]).unwrap();
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.get(&"a").unwrap(), 1.0);
        assert_eq!(merged.get(&"b").unwrap(), 2.0);
        assert_eq!(merged.value().default(), Some(0.0));
    }

    #[test]
    fn test_merge_disagreeing_defaults_drop() {
        let tape = Tape::new();
        let a = tape.leaf(NumDict::from_pairs([("a", 1.0)], Some(0.0)));
        let b = tape.leaf(NumDict::from_pairs([("b", 2.0)], Some(1.0)));
        assert_eq!(merge(&[&a, &b]).unwrap().value().default(), None);
    }

    #[test]
    fn test_merge_rejects_overlap_and_empty() {
        let tape = Tape::new();
        let a = tape.leaf(NumDict::from_pairs([("a", 1.0)], None));
        let b = tape.leaf(NumDict::from_pairs([("a", 2.0)], None));
        assert!(matches!(
            merge(&[&a, &b]),
            Err(NumDictError::NotDisjoint { .. })
        ));
        assert!(matches!(
            merge::<&str>(&[]),
            Err(NumDictError::EmptyMerge)
        ));
    }

    #[test]
    fn test_merge_gradient_routes_per_operand() {
        let tape = Tape::new();
        let a = tape.leaf(NumDict::from_pairs([("a", 1.0)], None));
        let b = tape.leaf(NumDict::from_pairs([("b", 2.0), ("c", 3.0)], None));
        let total = reduce_sum(&merge(&[&a, &b]).unwrap(), None).unwrap();
        let grads = backward(&total).unwrap();
        assert_eq!(grads.wrt(&a).unwrap().len(), 1);
        assert_eq!(grads.wrt(&b).unwrap().len(), 2);
        assert_eq!(grads.wrt(&b).unwrap().get(&"c").unwrap(), 1.0);
    }

    #[test]
    fn test_set_by_reads_source_through_map() {
        let tape = Tape::new();
        let target = tape.leaf(NumDict::from_pairs([("x1", 0.0), ("x2", 0.0)], None));
        let source = tape.leaf(NumDict::from_pairs([("x", 7.0)], None));
        let keyfunc = KeyMap::new(|k: &&str| &k[..1]);
        let out = set_by(&target, &source, &keyfunc).unwrap();
        assert_eq!(out.get(&"x1").unwrap(), 7.0);
        assert_eq!(out.get(&"x2").unwrap(), 7.0);
        assert_eq!(out.value().default(), None);
    }

    #[test]
    fn test_set_by_gradient_skips_target() {
        let tape = Tape::new();
        let target = tape.leaf(NumDict::from_pairs([("x1", 0.0), ("x2", 0.0)], None));
        let source = tape.leaf(NumDict::from_pairs([("x", 7.0)], None));
        let keyfunc = KeyMap::new(|k: &&str| &k[..1]);
        let total = reduce_sum(&set_by(&target, &source, &keyfunc).unwrap(), None).unwrap();
        let grads = backward(&total).unwrap();
        // Both readers contribute to the single source entry.
        assert_relative_eq!(grads.wrt(&source).unwrap().get(&"x").unwrap(), 2.0);
        assert_eq!(grads.wrt(&target).unwrap().get(&"x1").unwrap(), 0.0);
    }

    #[test]
    fn test_transform_keys_renames() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], Some(0.5)));
        let upper = KeyMap::new(|k: &&str| match *k {
            "a" => "A",
            "b" => "B",
            other => other,
        });
        let out = transform_keys(&d, &upper).unwrap();
        assert_eq!(out.get(&"A").unwrap(), 1.0);
        assert_eq!(out.get(&"B").unwrap(), 2.0);
        assert_eq!(out.value().default(), Some(0.5));
    }

    #[test]
    fn test_transform_keys_rejects_collisions() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], None));
        let collapse = KeyMap::new(|_: &&str| "same");
        assert!(matches!(
            transform_keys(&d, &collapse),
            Err(NumDictError::NonInjectiveKeyMap)
        ));
    }

    #[test]
    fn test_transform_keys_gradient_uses_output_keys() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs([("a", 1.0)], None));
        let rename = KeyMap::new(|_: &&str| "A");
        let total = reduce_sum(&transform_keys(&d, &rename).unwrap(), None).unwrap();
        let grads = backward(&total).unwrap();
        let g = grads.wrt(&d).unwrap();
        assert_eq!(g.get(&"A").unwrap(), 1.0);
        assert!(!g.contains_key(&"a"));
    }

    #[test]
    fn test_group_sum_buckets() {
        let d = NumDict::from_pairs([("x1", 1.0), ("x2", 2.0), ("y1", 5.0)], None);
        let keyfunc = KeyMap::new(|k: &&str| &k[..1]);
        let grouped = group_sum(&d, &keyfunc);
        assert_eq!(grouped.get(&"x").unwrap(), 3.0);
        assert_eq!(grouped.get(&"y").unwrap(), 5.0);
    }

    #[test]
    fn test_sum_by_groups_and_differentiates() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs(
            [("x1", 1.0), ("x2", 2.0), ("y1", 5.0)],
            None,
        ));
        let keyfunc = KeyMap::new(|k: &&str| &k[..1]);
        let grouped = sum_by(&d, &keyfunc).unwrap();
        assert_eq!(grouped.get(&"x").unwrap(), 3.0);
        assert_eq!(grouped.get(&"y").unwrap(), 5.0);

        let total = reduce_sum(&grouped, None).unwrap();
        let grads = backward(&total).unwrap();
        let g = grads.wrt(&d).unwrap();
        assert_eq!(g.get(&"x1").unwrap(), 1.0);
        assert_eq!(g.get(&"x2").unwrap(), 1.0);
        assert_eq!(g.get(&"y1").unwrap(), 1.0);
    }

    #[test]
    fn test_max_by_and_min_by() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs(
            [("x1", 1.0), ("x2", 4.0), ("y1", -2.0), ("y2", 3.0)],
            None,
        ));
        let keyfunc = KeyMap::new(|k: &&str| &k[..1]);

        let maxed = max_by(&d, &keyfunc).unwrap();
        assert_eq!(maxed.get(&"x").unwrap(), 4.0);
        assert_eq!(maxed.get(&"y").unwrap(), 3.0);

        let minned = min_by(&d, &keyfunc).unwrap();
        assert_eq!(minned.get(&"x").unwrap(), 1.0);
        assert_eq!(minned.get(&"y").unwrap(), -2.0);
    }

    #[test]
    fn test_max_by_gradient_picks_group_winners() {
        let tape = Tape::new();
        let d = tape.leaf(NumDict::from_pairs(
            [("x1", 1.0), ("x2", 4.0), ("y1", -2.0), ("y2", 3.0)],
            None,
        ));
        let keyfunc = KeyMap::new(|k: &&str| &k[..1]);
        let total = reduce_sum(&max_by(&d, &keyfunc).unwrap(), None).unwrap();
        let grads = backward(&total).unwrap();
        let g = grads.wrt(&d).unwrap();
        assert_eq!(g.get(&"x1").unwrap(), 0.0);
        assert_eq!(g.get(&"x2").unwrap(), 1.0);
        assert_eq!(g.get(&"y1").unwrap(), 0.0);
        assert_eq!(g.get(&"y2").unwrap(), 1.0);
    }
}
