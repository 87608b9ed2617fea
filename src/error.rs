//! Error types for graph evaluation.

use crate::node_type::NodeType;
use crate::stat::Stat;
use thiserror::Error;

/// Errors raised while evaluating calculation nodes.
///
/// Evaluation errors are not caught internally; they propagate to whoever
/// triggered the evaluation (usually a batch's forced recomputation).
/// Unrelated nodes in the same batch are unaffected, since evaluation is
/// per node.
///
/// # Examples
///
/// ```rust
/// use modgraph::{CalcError, NodeType, Stat};
///
/// let err = CalcError::UnsupportedAggregation {
///     stat: Stat::new("Life"),
///     node_type: NodeType::BaseOverride,
///     reason: "2 conflicting nonzero overrides".to_string(),
/// };
/// assert!(err.to_string().contains("Life"));
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalcError {
    /// An aggregation with a single-writer rule (`BaseSet` minimum/maximum
    /// components, `BaseOverride`, `TotalOverride`) found more than one
    /// conflicting nonzero contribution on one `(stat, path)`.
    ///
    /// This is an authoring conflict in the modifier set and is deliberately
    /// fatal to the query rather than silently resolved.
    #[error("unsupported aggregation on {stat} ({node_type:?}): {reason}")]
    UnsupportedAggregation {
        stat: Stat,
        node_type: NodeType,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CalcError::UnsupportedAggregation {
            stat: Stat::new("Armour"),
            node_type: NodeType::TotalOverride,
            reason: "2 conflicting nonzero overrides".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("Armour"));
        assert!(display.contains("TotalOverride"));
        assert!(display.contains("conflicting"));
    }
}
