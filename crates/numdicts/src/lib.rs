//! numdicts - sparse key-addressed numeric maps with reverse-mode autodiff.
//!
//! A [`NumDict`] maps symbolic keys to `f64` values and answers every other
//! key through an optional default, so open-ended key universes stay cheap.
//! Elementwise operations work over the union of explicit keys, reading
//! absent entries through the defaults.
//!
//! # Architecture
//!
//! ```text
//! Level 1: Value containers
//!     → NumDict (immutable), MutableNumDict (in-place updates)
//!
//! Level 2: Operation library (autodiff::ops)
//!     → arithmetic, transcendental, filtering, reductions, grouping,
//!       boltzmann
//!
//! Level 3: Differentiation machinery (autodiff)
//!     → Tape (record log), Registry (gradient rules), backward
//! ```
//!
//! The autodiff layer is behind the `autodiff` feature (on by default);
//! with it disabled the crate is just the value containers.
//!
//! # Example
//!
//! ```
//! use numdicts::NumDict;
//! use numdicts::autodiff::{backward, ops, Tape};
//!
//! let tape = Tape::new();
//! let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0)], None));
//!
//! // y = sum(d * d); dy/dd = 2d
//! let total = ops::reduce_sum(&(&d * &d), None).unwrap();
//! let grads = backward(&total).unwrap();
//!
//! let g = grads.wrt(&d).unwrap();
//! assert_eq!(g.get(&"a").unwrap(), 2.0);
//! assert_eq!(g.get(&"b").unwrap(), 4.0);
//! ```

pub mod error;
pub mod key;
mod mutable;
mod numdict;

#[cfg(feature = "autodiff")]
pub mod autodiff;

pub use error::NumDictError;
pub use key::Key;
pub use mutable::MutableNumDict;
pub use numdict::{NumDict, CLOSE_TOL};
