//! Thresholding, clamping, and key-filtering primitives.

use crate::autodiff::args::{KeyFilter, OpArgs};
use crate::autodiff::registry::{GradVec, OpId, Registry};
use crate::autodiff::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use smallvec::smallvec;
use std::collections::HashMap;

pub const THRESHOLD: OpId = OpId("threshold");
pub const CLIP: OpId = OpId("clip");
pub const KEEP: OpId = OpId("keep");
pub const DROP: OpId = OpId("drop");

/// Keep entries whose value strictly exceeds `th`.
///
/// The output default is dropped to `None` unless it already exceeds `th`
/// or `keep_default` is set. The boundary is excluded: an entry exactly at
/// `th` is removed and receives zero gradient.
pub fn threshold<K: Key>(
    d: &TrackedDict<K>,
    th: f64,
    keep_default: bool,
) -> Result<TrackedDict<K>, NumDictError> {
    let mapping: HashMap<K, f64> = d
        .value()
        .iter()
        .filter(|(_, v)| *v > th)
        .map(|(k, v)| (k.clone(), v))
        .collect();
    let default = match d.value().default() {
        Some(dv) if keep_default || dv > th => Some(dv),
        _ => None,
    };
    d.tape().record(
        THRESHOLD,
        NumDict::new(mapping, default),
        &[d],
        OpArgs::Threshold { th, keep_default },
    )
}

/// Clamp every value into `[low, high]`; open bounds default to ±infinity.
///
/// The default value itself is carried through unclamped.
pub fn clip<K: Key>(
    d: &TrackedDict<K>,
    low: Option<f64>,
    high: Option<f64>,
) -> Result<TrackedDict<K>, NumDictError> {
    let low = low.unwrap_or(f64::NEG_INFINITY);
    let high = high.unwrap_or(f64::INFINITY);
    let mapping: HashMap<K, f64> = d
        .value()
        .iter()
        .map(|(k, v)| (k.clone(), v.clamp(low, high)))
        .collect();
    d.tape().record(
        CLIP,
        NumDict::new(mapping, d.value().default()),
        &[d],
        OpArgs::Clip { low, high },
    )
}

/// Retain entries whose key matches the filter (predicate OR key set).
///
/// Fails with a configuration error if the filter has neither criterion.
/// The input default is preserved.
pub fn keep<K: Key>(
    d: &TrackedDict<K>,
    filter: KeyFilter<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    if filter.is_vacuous() {
        return Err(NumDictError::MissingFilter);
    }
    let mapping: HashMap<K, f64> = d
        .value()
        .iter()
        .filter(|(k, _)| filter.matches(k))
        .map(|(k, v)| (k.clone(), v))
        .collect();
    d.tape().record(
        KEEP,
        NumDict::new(mapping, d.value().default()),
        &[d],
        OpArgs::Filter(filter),
    )
}

/// Retain entries whose key the filter's predicate rejects AND that are
/// outside the filter's key set.
///
/// Note this is not the complement of [`keep`] when only one criterion is
/// supplied: the missing criterion retains nothing. The behavior is pinned
/// by tests rather than silently repaired.
pub fn drop<K: Key>(
    d: &TrackedDict<K>,
    filter: KeyFilter<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    if filter.is_vacuous() {
        return Err(NumDictError::MissingFilter);
    }
    let mapping: HashMap<K, f64> = d
        .value()
        .iter()
        .filter(|(k, _)| filter.retains_on_drop(k))
        .map(|(k, v)| (k.clone(), v))
        .collect();
    d.tape().record(
        DROP,
        NumDict::new(mapping, d.value().default()),
        &[d],
        OpArgs::Filter(filter),
    )
}

/// Indicator-mask gradient shared by the filtering primitives: upstream
/// passes through where `retained` holds, zero elsewhere.
fn masked_gradient<K: Key>(
    upstream: &NumDict<K>,
    d: &NumDict<K>,
    retained: impl Fn(&K, f64) -> bool,
    default: Option<f64>,
) -> Result<NumDict<K>, NumDictError> {
    let mut mapping = HashMap::with_capacity(d.len());
    for (k, v) in d.iter() {
        let g = if retained(k, v) { upstream.get(k)? } else { 0.0 };
        mapping.insert(k.clone(), g);
    }
    Ok(NumDict::new(mapping, default))
}

fn grad_threshold<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let (th, _) = args.as_threshold();
    let d = &inputs[0];
    let default = if d.default().is_some() {
        upstream.default()
    } else {
        None
    };
    Ok(smallvec![masked_gradient(
        upstream,
        d,
        |_, v| v > th,
        default
    )?])
}

fn grad_clip<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let (low, high) = args.as_clip();
    let d = &inputs[0];
    Ok(smallvec![masked_gradient(
        upstream,
        d,
        |_, v| low < v && v < high,
        upstream.default(),
    )?])
}

fn grad_keep<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let filter = args.as_filter();
    Ok(smallvec![masked_gradient(
        upstream,
        &inputs[0],
        |k, _| filter.matches(k),
        upstream.default(),
    )?])
}

fn grad_drop<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let filter = args.as_filter();
    Ok(smallvec![masked_gradient(
        upstream,
        &inputs[0],
        |k, _| filter.retains_on_drop(k),
        upstream.default(),
    )?])
}

pub(crate) fn install<K: Key>(registry: &mut Registry<K>) {
    registry.register_op(THRESHOLD);
    registry.register_op(CLIP);
    registry.register_op(KEEP);
    registry.register_op(DROP);
    registry
        .register_grad(THRESHOLD, grad_threshold)
        .and_then(|_| registry.register_grad(CLIP, grad_clip))
        .and_then(|_| registry.register_grad(KEEP, grad_keep))
        .and_then(|_| registry.register_grad(DROP, grad_drop))
        .expect("builtin filter ops are registered before their gradients");
}
