//! Calculation node stages.

use serde::{Deserialize, Serialize};

/// The aggregation stages a stat's value passes through.
///
/// Raw modifier contributions enter at the form nodes (`BaseSet`, `BaseAdd`,
/// `BaseOverride`, `Increase`, `More`, `TotalOverride`); the derived stages
/// combine them per path and across paths:
///
/// ```text
/// BaseSet ─┐
/// BaseAdd ─┴→ Base ──→ PathTotal ──→ Subtotal ──→ Total
/// BaseOverride ↗        ↑ ↑                        ↑
///              Increase ┘ └ More       TotalOverride
/// ```
///
/// Every `(stat, node type, path)` triple is one calculation node, except
/// `Total` and `TotalOverride`, which exist only on the main path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Final value: `TotalOverride` if present, else the clipped sum of all
    /// path subtotals.
    Total,
    /// Override of the final value.
    TotalOverride,
    /// A path's total, clipped by the stat's Minimum/Maximum stats.
    Subtotal,
    /// `Base × (1 + Increase) × More` for one path, unclipped.
    PathTotal,
    /// Combined base: `BaseOverride`, else the rounded `BaseSet + BaseAdd`.
    Base,
    /// Override of the combined base.
    BaseOverride,
    /// Raw base-set contributions.
    BaseSet,
    /// Raw additive base contributions.
    BaseAdd,
    /// Additive percentages, as a fraction (`0.42` for 42% increased).
    Increase,
    /// Multiplicative percentages, as a multiplier (`1.5` for 50% more).
    More,
}

impl NodeType {
    /// Whether this node aggregates raw modifier contributions directly.
    pub fn is_form_node(self) -> bool {
        matches!(
            self,
            NodeType::BaseSet
                | NodeType::BaseAdd
                | NodeType::BaseOverride
                | NodeType::Increase
                | NodeType::More
                | NodeType::TotalOverride
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_nodes() {
        assert!(NodeType::BaseAdd.is_form_node());
        assert!(NodeType::TotalOverride.is_form_node());
        assert!(!NodeType::Total.is_form_node());
        assert!(!NodeType::PathTotal.is_form_node());
        assert!(!NodeType::Base.is_form_node());
    }
}
