//! Pointwise transcendental primitives and their compositions.

use super::arith::{add, div, mul, neg, sub};
use crate::autodiff::args::OpArgs;
use crate::autodiff::registry::{GradVec, OpId, Registry};
use crate::autodiff::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use smallvec::smallvec;

pub const LOG: OpId = OpId("log");
pub const EXP: OpId = OpId("exp");

/// Pointwise natural logarithm.
pub fn log<K: Key>(d: &TrackedDict<K>) -> Result<TrackedDict<K>, NumDictError> {
    let value = d.value().ln();
    d.tape().record(LOG, value, &[d], OpArgs::None)
}

/// Pointwise base-e exponential.
pub fn exp<K: Key>(d: &TrackedDict<K>) -> Result<TrackedDict<K>, NumDictError> {
    let value = d.value().exp();
    d.tape().record(EXP, value, &[d], OpArgs::None)
}

/// The logistic function, `1 / (1 + exp(-d))`.
///
/// Composed from recorded primitives, so it is differentiable without a
/// gradient rule of its own and must not record itself.
pub fn sigmoid<K: Key>(d: &TrackedDict<K>) -> Result<TrackedDict<K>, NumDictError> {
    let one = d.tape().scalar(1.0);
    let e = exp(&neg(d)?)?;
    div(&one, &add(&one, &e)?)
}

/// The logistic squash `2 * sigmoid(d) - 1`, mapping onto `(-1, 1)`.
///
/// Equal to the hyperbolic tangent of `d / 2`, not of `d`; callers wanting
/// the standard tangent should scale the argument. Differentiable by
/// composition, like [`sigmoid`].
pub fn tanh<K: Key>(d: &TrackedDict<K>) -> Result<TrackedDict<K>, NumDictError> {
    let two = d.tape().scalar(2.0);
    let one = d.tape().scalar(1.0);
    sub(&mul(&two, &sigmoid(d)?)?, &one)
}

fn grad_log<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    _args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    Ok(smallvec![upstream.combine(&inputs[0], |g, x| g / x)?])
}

fn grad_exp<K: Key>(
    upstream: &NumDict<K>,
    inputs: &[NumDict<K>],
    _args: &OpArgs<K>,
) -> Result<GradVec<K>, NumDictError> {
    Ok(smallvec![
        upstream.combine(&inputs[0], |g, x| g * x.exp())?
    ])
}

pub(crate) fn install<K: Key>(registry: &mut Registry<K>) {
    registry.register_op(LOG);
    registry.register_op(EXP);
    registry
        .register_grad(LOG, grad_log)
        .and_then(|_| registry.register_grad(EXP, grad_exp))
        .expect("builtin math ops are registered before their gradients");
}
