//! Backward pass execution for reverse-mode differentiation.

use super::gradients::Gradients;
use super::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;

/// Execute the backward pass from an output with the conventional seed:
/// ones over the output's explicit keys and a default of one.
///
/// Returns gradients of the output with respect to every tracked ancestor,
/// accumulated across paths.
///
/// # Errors
///
/// Fails if the output is not tracked, if a visited record's operation has
/// no registered gradient rule, or if a gradient rule itself fails.
///
/// # Example
///
/// ```
/// use numdicts::NumDict;
/// use numdicts::autodiff::{backward, ops, Tape};
///
/// let tape = Tape::new();
/// let d = tape.leaf(NumDict::from_pairs([("a", 1.0), ("b", 2.0), ("c", 3.0)], None));
/// let top = ops::reduce_max(&d, None).unwrap();
///
/// let grads = backward(&top).unwrap();
/// let g = grads.wrt(&d).unwrap();
/// assert_eq!(g.get(&"c").unwrap(), 1.0);
/// assert_eq!(g.get(&"a").unwrap(), 0.0);
/// ```
pub fn backward<K: Key>(output: &TrackedDict<K>) -> Result<Gradients<K>, NumDictError> {
    let seed = output.value().constant(1.0).with_default(Some(1.0));
    backward_seeded(output, seed)
}

/// Execute the backward pass from an output with a caller-supplied upstream
/// gradient.
///
/// Walks the tape in strict reverse creation order, so every consumer of a
/// node has contributed its share before that node's own rule runs. Each
/// visited record's rule receives the accumulated upstream gradient and the
/// record's original input snapshots and arguments; the per-input gradients
/// it returns are summed onto each tracked input's running total. Nodes
/// with no producing record are leaves and keep their totals.
pub fn backward_seeded<K: Key>(
    output: &TrackedDict<K>,
    seed: NumDict<K>,
) -> Result<Gradients<K>, NumDictError> {
    let root = output.node_id().ok_or(NumDictError::Untracked)?;

    let mut grads = Gradients::new();
    grads.accumulate(root, seed)?;

    let tape = output.tape();
    let num_records = tape.inner.borrow().records.len();

    for index in (0..num_records).rev() {
        // Clone the record out so no tape borrow is held while the rule
        // runs; rules are pure but may be caller-supplied.
        let (op, out_node, record) = {
            let inner = tape.inner.borrow();
            let record = &inner.records[index];
            (record.op, record.output, record.clone())
        };

        let upstream = match grads.remove(out_node) {
            Some(g) => g,
            None => continue, // no gradient flows through this record
        };

        let rule = tape
            .inner
            .borrow()
            .registry
            .rule(op)
            .ok_or(NumDictError::MissingGradRule { op: op.name() })?;

        let snapshots: Vec<NumDict<K>> =
            record.inputs.iter().map(|input| input.value.clone()).collect();
        let input_grads = rule(&upstream, &snapshots, &record.args)?;
        debug_assert_eq!(input_grads.len(), record.inputs.len());

        for (input, grad) in record.inputs.iter().zip(input_grads) {
            if let Some(id) = input.node {
                grads.accumulate(id, grad)?;
            }
        }
    }

    Ok(grads)
}
