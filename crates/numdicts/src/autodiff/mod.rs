//! Reverse-mode automatic differentiation over numdicts.
//!
//! The layer is built from four pieces:
//!
//! - a [`Tape`]: a caller-owned, append-only log of primitive invocations
//!   for one forward computation;
//! - a [`Registry`]: an explicit table mapping each primitive [`OpId`] to
//!   its backward rule, assembled at startup;
//! - [`TrackedDict`]: a numdict bound to a tape, produced by [`Tape::leaf`],
//!   [`Tape::constant`], or any operation in [`ops`];
//! - [`backward`]: the reverse walk over the tape that turns the log into a
//!   [`Gradients`] table.
//!
//! There is no process-wide recording state: all bookkeeping lives in the
//! tape handle that tracked values carry, so independent computations can
//! run side by side on separate tapes.
//!
//! # Example
//!
//! ```
//! use numdicts::NumDict;
//! use numdicts::autodiff::{backward, ops, Tape};
//!
//! let tape = Tape::new();
//! let d = tape.leaf(NumDict::from_pairs([("a", 0.0), ("b", 1.0)], None));
//! let total = ops::reduce_sum(&ops::sigmoid(&d).unwrap(), None).unwrap();
//!
//! let grads = backward(&total).unwrap();
//! let g = grads.wrt(&d).unwrap();
//! assert!((g.get(&"a").unwrap() - 0.25).abs() < 1e-12);
//! ```

mod args;
mod backward;
mod gradients;
mod registry;
mod tape;
mod tracked;

pub mod ops;

pub use args::{KeyFilter, KeyMap, OpArgs};
pub use backward::{backward, backward_seeded};
pub use gradients::Gradients;
pub use registry::{GradRule, GradVec, OpId, Registry};
pub use tape::{NodeId, Tape};
pub use tracked::TrackedDict;
