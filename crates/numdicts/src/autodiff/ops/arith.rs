//! Recorded elementwise arithmetic primitives.

use crate::autodiff::args::OpArgs;
use crate::autodiff::registry::{GradVec, OpId, Registry};
use crate::autodiff::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use smallvec::smallvec;

pub const ADD: OpId = OpId("add");
pub const SUB: OpId = OpId("sub");
pub const MUL: OpId = OpId("mul");
pub const DIV: OpId = OpId("div");
pub const NEG: OpId = OpId("neg");
pub const POW: OpId = OpId("pow");

/// Pointwise sum over the union of explicit keys.
pub fn add<K: Key>(
    a: &TrackedDict<K>,
    b: &TrackedDict<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    let value = a.value().combine(b.value(), |x, y| x + y)?;
    a.tape().record(ADD, value, &[a, b], OpArgs::None)
}

/// Pointwise difference over the union of explicit keys.
pub fn sub<K: Key>(
    a: &TrackedDict<K>,
    b: &TrackedDict<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    let value = a.value().combine(b.value(), |x, y| x - y)?;
    a.tape().record(SUB, value, &[a, b], OpArgs::None)
}

/// Pointwise product over the union of explicit keys.
pub fn mul<K: Key>(
    a: &TrackedDict<K>,
    b: &TrackedDict<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    let value = a.value().combine(b.value(), |x, y| x * y)?;
    a.tape().record(MUL, value, &[a, b], OpArgs::None)
}

/// Pointwise quotient over the union of explicit keys.
pub fn div<K: Key>(
    a: &TrackedDict<K>,
    b: &TrackedDict<K>,
) -> Result<TrackedDict<K>, NumDictError> {
    let value = a.value().combine(b.value(), |x, y| x / y)?;
    a.tape().record(DIV, value, &[a, b], OpArgs::None)
}

/// Pointwise negation.
pub fn neg<K: Key>(d: &TrackedDict<K>) -> Result<TrackedDict<K>, NumDictError> {
    let value = d.value().map(|v| -v);
    d.tape().record(NEG, value, &[d], OpArgs::None)
}

/// Pointwise power with a scalar exponent.
pub fn powf<K: Key>(d: &TrackedDict<K>, p: f64) -> Result<TrackedDict<K>, NumDictError> {
    let value = d.value().powf(p);
    d.tape().record(POW, value, &[d], OpArgs::Scalar { value: p })
}

fn grad_add<K: Key>(
    upstream: &NumDict<K>,
    _inputs: &[NumDict<K>],
    _args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    Ok(smallvec![upstream.clone(), upstream.clone()])
}

fn grad_sub<K: Key>(
    upstream: &NumDict<K>,
    _inputs: &[NumDict<K>],
    _args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    Ok(smallvec![upstream.clone(), upstream.map(|g| -g)])
}

fn grad_mul<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    _args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let (a, b) = (&inputs[0], &inputs[1]);
    Ok(smallvec![
        upstream.combine(b, |g, y| g * y)?,
        upstream.combine(a, |g, x| g * x)?,
    ])
}

fn grad_div<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    _args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let (a, b) = (&inputs[0], &inputs[1]);
    let grad_a = upstream.combine(b, |g, y| g / y)?;
    let grad_b = upstream.combine(a, |g, x| g * x)?.combine(b, |t, y| -t / (y * y))?;
    Ok(smallvec![grad_a, grad_b])
}

fn grad_neg<K: Key>(
    upstream: &NumDict<K>,
    _inputs: &[NumDict<K>],
    _args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    Ok(smallvec![upstream.map(|g| -g)])
}

fn grad_powf<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    let p = args.as_scalar();
    let d = &inputs[0];
    Ok(smallvec![
        upstream.combine(d, |g, x| g * p * x.powf(p - 1.0))?
    ])
}

pub(crate) fn install<K: Key>(registry: &mut Registry<K>) {
    registry.register_op(ADD);
    registry.register_op(SUB);
    registry.register_op(MUL);
    registry.register_op(DIV);
    registry.register_op(NEG);
    registry.register_op(POW);
    registry
        .register_grad(ADD, grad_add)
        .and_then(|_| registry.register_grad(SUB, grad_sub))
        .and_then(|_| registry.register_grad(MUL, grad_mul))
        .and_then(|_| registry.register_grad(DIV, grad_div))
        .and_then(|_| registry.register_grad(NEG, grad_neg))
        .and_then(|_| registry.register_grad(POW, grad_powf))
        .expect("builtin arithmetic ops are registered before their gradients");
}
