//! Gradient storage container.

use super::tape::NodeId;
use super::tracked::TrackedDict;
use crate::error::NumDictError;
use crate::key::Key;
use crate::numdict::NumDict;
use std::collections::HashMap;

/// Container for accumulated gradients.
///
/// Stores gradients keyed by node, adding pointwise when a node receives
/// contributions from more than one downstream record (the multivariate
/// chain rule).
#[derive(Debug)]
pub struct Gradients<K: Key> {
    grads: HashMap<NodeId, NumDict<K>>,
}

impl<K: Key> Gradients<K> {
    /// Create an empty gradient container.
    pub fn new() -> Self {
        Self {
            grads: HashMap::new(),
        }
    }

    /// Accumulate a gradient for a node, adding to any existing total.
    pub fn accumulate(&mut self, id: NodeId, grad: NumDict<K>) -> Result<(), NumDictError> {
        match self.grads.remove(&id) {
            Some(existing) => {
                let total = existing.combine(&grad, |a, b| a + b)?;
                self.grads.insert(id, total);
            }
            None => {
                self.grads.insert(id, grad);
            }
        }
        Ok(())
    }

    /// Gradient accumulated for a node.
    pub fn get(&self, id: NodeId) -> Option<&NumDict<K>> {
        self.grads.get(&id)
    }

    /// Gradient with respect to a tracked value.
    pub fn wrt(&self, d: &TrackedDict<K>) -> Option<&NumDict<K>> {
        d.node_id().and_then(|id| self.get(id))
    }

    /// Remove and return a node's gradient (used while walking the tape).
    pub fn remove(&mut self, id: NodeId) -> Option<NumDict<K>> {
        self.grads.remove(&id)
    }

    /// Whether a gradient exists for the node.
    pub fn contains(&self, id: NodeId) -> bool {
        self.grads.contains_key(&id)
    }

    /// Number of stored gradients.
    pub fn len(&self) -> usize {
        self.grads.len()
    }

    /// Whether no gradients are stored.
    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }

    /// Iterate over all stored gradients.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &NumDict<K>)> {
        self.grads.iter()
    }
}

impl<K: Key> Default for Gradients<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradients_new() {
        let grads: Gradients<&str> = Gradients::new();
        assert!(grads.is_empty());
        assert_eq!(grads.len(), 0);
    }

    #[test]
    fn test_accumulate_single() {
        let mut grads: Gradients<&str> = Gradients::new();
        let id = NodeId::new_for_test(0);
        let g = NumDict::from_pairs([("a", 1.0)], None);

        grads.accumulate(id, g.clone()).unwrap();
        assert!(grads.contains(id));
        assert_eq!(grads.get(id).unwrap(), &g);
    }

    #[test]
    fn test_accumulate_sums_contributions() {
        let mut grads: Gradients<&str> = Gradients::new();
        let id = NodeId::new_for_test(0);

        grads
            .accumulate(id, NumDict::from_pairs([("a", 1.0), ("b", 2.0)], Some(0.0)))
            .unwrap();
        grads
            .accumulate(id, NumDict::from_pairs([("a", 4.0), ("b", 5.0)], Some(1.0)))
            .unwrap();

        let total = grads.get(id).unwrap();
        assert_eq!(total.get(&"a").unwrap(), 5.0);
        assert_eq!(total.get(&"b").unwrap(), 7.0);
        assert_eq!(total.default(), Some(1.0));
    }

    #[test]
    fn test_accumulate_coverage_mismatch_fails() {
        let mut grads: Gradients<&str> = Gradients::new();
        let id = NodeId::new_for_test(0);

        grads
            .accumulate(id, NumDict::from_pairs([("a", 1.0)], None))
            .unwrap();
        let result = grads.accumulate(id, NumDict::from_pairs([("b", 1.0)], None));
        assert!(result.is_err());
    }

    #[test]
    fn test_remove() {
        let mut grads: Gradients<&str> = Gradients::new();
        let id = NodeId::new_for_test(0);
        grads
            .accumulate(id, NumDict::from_pairs([("a", 1.0)], None))
            .unwrap();

        assert!(grads.remove(id).is_some());
        assert!(!grads.contains(id));
    }
}
