//! Per-node vote weights.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crisp_core::NodeId;

/// Weight given to nodes with no recorded reputation.
pub const DEFAULT_REPUTATION: f64 = 1.0;

/// Non-negative vote weight per node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReputationTable {
    weights: HashMap<NodeId, f64>,
}

impl ReputationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a node's weight. Negative and non-finite weights become 0.
    pub fn set(&mut self, node: NodeId, weight: f64) {
        let weight = if weight.is_finite() && weight > 0.0 {
            weight
        } else {
            0.0
        };
        self.weights.insert(node, weight);
    }

    /// A node's weight, `DEFAULT_REPUTATION` if unknown.
    pub fn weight(&self, node: &NodeId) -> f64 {
        self.weights
            .get(node)
            .copied()
            .unwrap_or(DEFAULT_REPUTATION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_node_has_default_weight() {
        let table = ReputationTable::new();
        assert_eq!(table.weight(&NodeId::new("stranger")), 1.0);
    }

    #[test]
    fn test_invalid_weights_clamped() {
        let mut table = ReputationTable::new();
        table.set(NodeId::new("neg"), -3.0);
        table.set(NodeId::new("nan"), f64::NAN);
        table.set(NodeId::new("inf"), f64::INFINITY);
        table.set(NodeId::new("ok"), 2.5);

        assert_eq!(table.weight(&NodeId::new("neg")), 0.0);
        assert_eq!(table.weight(&NodeId::new("nan")), 0.0);
        assert_eq!(table.weight(&NodeId::new("inf")), 0.0);
        assert_eq!(table.weight(&NodeId::new("ok")), 2.5);
    }
}
