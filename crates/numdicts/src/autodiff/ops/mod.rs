//! The builtin operation library.
//!
//! Each submodule defines a family of primitives (forward functions that
//! record themselves on the tape), their gradient rules, and an `install`
//! hook that registers both. [`Registry::with_builtins`] calls every hook,
//! so a fresh [`Tape`](crate::autodiff::Tape) can differentiate the whole
//! library out of the box.
//!
//! Functions like [`sigmoid`], [`tanh`], and the grouped reductions are
//! compositions of primitives: they never record themselves and need no
//! gradient rule of their own.
//!
//! [`Registry::with_builtins`]: crate::autodiff::Registry::with_builtins

mod arith;
mod boltzmann;
mod filter;
mod group;
mod math;
mod reduce;

pub use arith::{add, div, mul, neg, powf, sub};
pub use arith::{ADD, DIV, MUL, NEG, POW, SUB};
pub use boltzmann::{boltzmann, BOLTZMANN};
pub use filter::{clip, drop, keep, threshold};
pub use filter::{CLIP, DROP, KEEP, THRESHOLD};
pub use group::{by, max_by, merge, min_by, set_by, sum_by, transform_keys};
pub use group::{MERGE, SET_BY, TRANSFORM_KEYS};
pub use math::{exp, log, sigmoid, tanh, EXP, LOG};
pub use reduce::{reduce_max, reduce_min, reduce_sum};
pub use reduce::{REDUCE_MAX, REDUCE_MIN, REDUCE_SUM};

use super::registry::Registry;
use crate::key::Key;

/// Register every builtin primitive and its gradient rule.
pub(crate) fn install_builtins<K: Key>(registry: &mut Registry<K>) {
    arith::install(registry);
    math::install(registry);
    filter::install(registry);
    reduce::install(registry);
    group::install(registry);
    boltzmann::install(registry);
}
