//! Pure aggregation functions.
//!
//! Each function folds the contributions of one form on one `(stat, path)`
//! into a single optional value. All of them are order-independent: sums and
//! products commute, and the single-writer rules for overrides and base-set
//! hold regardless of contribution order.

use crate::error::CalcError;
use crate::node_type::NodeType;
use crate::stat::Stat;
use crate::value::{sum_where_some, NodeValue};

/// `BaseAdd`: sum of all non-null contributions, null if there are none.
pub fn base_add(values: &[Option<NodeValue>]) -> Option<NodeValue> {
    sum_where_some(values.iter().copied())
}

/// `Increase`: sum of `v / 100` over all non-null contributions, null if
/// there are none.
pub fn increase(values: &[Option<NodeValue>]) -> Option<NodeValue> {
    sum_where_some(
        values
            .iter()
            .copied()
            .map(|v| v.map(|v| v / NodeValue::from(100.0))),
    )
}

/// `More`: product of `1 + v / 100` over all non-null contributions, null
/// if there are none.
pub fn more(values: &[Option<NodeValue>]) -> Option<NodeValue> {
    values
        .iter()
        .copied()
        .flatten()
        .map(|v| NodeValue::ONE + v / NodeValue::from(100.0))
        .fold(None, |acc, v| Some(acc.map_or(v, |a: NodeValue| a * v)))
}

/// `BaseOverride` / `TotalOverride`: at most one nonzero writer.
///
/// No non-null contributions yield null; exactly one yields that value.
/// With several, a contribution of exactly zero wins (zero overrides
/// everything); several nonzero writers are undefined semantics and fail
/// with [`CalcError::UnsupportedAggregation`].
pub fn override_(
    values: &[Option<NodeValue>],
    stat: &Stat,
    node_type: NodeType,
) -> Result<Option<NodeValue>, CalcError> {
    let present: Vec<NodeValue> = values.iter().copied().flatten().collect();
    match present.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        many => {
            if many.iter().any(|v| *v == NodeValue::ZERO) {
                Ok(Some(NodeValue::ZERO))
            } else {
                Err(CalcError::UnsupportedAggregation {
                    stat: stat.clone(),
                    node_type,
                    reason: format!("{} conflicting nonzero overrides", many.len()),
                })
            }
        }
    }
}

/// `BaseSet`: sum of non-null contributions, with a single-writer rule per
/// range component.
///
/// At most one contribution may have a nonzero minimum component and at most
/// one a nonzero maximum component; more than one writer per component fails
/// with [`CalcError::UnsupportedAggregation`]. An empty contribution list is
/// null; contributions that all filter away as null yield zero.
pub fn base_set(values: &[Option<NodeValue>], stat: &Stat) -> Result<Option<NodeValue>, CalcError> {
    if values.is_empty() {
        return Ok(None);
    }
    let present: Vec<NodeValue> = values.iter().copied().flatten().collect();
    let minimum_writers = present.iter().filter(|v| v.minimum() != 0.0).count();
    let maximum_writers = present.iter().filter(|v| v.maximum() != 0.0).count();
    if minimum_writers > 1 || maximum_writers > 1 {
        return Err(CalcError::UnsupportedAggregation {
            stat: stat.clone(),
            node_type: NodeType::BaseSet,
            reason: format!(
                "{} minimum and {} maximum base-set writers",
                minimum_writers, maximum_writers
            ),
        });
    }
    Ok(Some(
        present
            .into_iter()
            .fold(NodeValue::ZERO, |acc, v| acc + v),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(v: f64) -> Option<NodeValue> {
        Some(NodeValue::from(v))
    }

    #[test]
    fn test_base_add() {
        assert_eq!(base_add(&[]), None);
        assert_eq!(base_add(&[None, None]), None);
        assert_eq!(base_add(&[some(53.0), None, some(270.0)]), some(323.0));
    }

    #[test]
    fn test_increase() {
        assert_eq!(increase(&[]), None);
        assert_eq!(increase(&[some(100.0), some(17.0)]), some(1.17));
    }

    #[test]
    fn test_more_is_multiplicative() {
        assert_eq!(more(&[]), None);
        assert_eq!(more(&[some(100.0)]), some(2.0));
        assert_eq!(more(&[some(100.0), some(50.0)]), some(3.0));
        assert_eq!(more(&[some(-50.0)]), some(0.5));
    }

    #[test]
    fn test_override_single_writer() {
        let stat = Stat::new("Life");
        assert_eq!(override_(&[], &stat, NodeType::BaseOverride), Ok(None));
        assert_eq!(
            override_(&[None, some(40.0)], &stat, NodeType::BaseOverride),
            Ok(some(40.0))
        );
    }

    #[test]
    fn test_override_zero_wins() {
        let stat = Stat::new("Life");
        assert_eq!(
            override_(&[some(40.0), some(0.0)], &stat, NodeType::TotalOverride),
            Ok(some(0.0))
        );
    }

    #[test]
    fn test_override_conflict_fails() {
        let stat = Stat::new("Life");
        let result = override_(&[some(40.0), some(60.0)], &stat, NodeType::BaseOverride);
        assert!(matches!(
            result,
            Err(CalcError::UnsupportedAggregation { .. })
        ));
    }

    #[test]
    fn test_base_set_sums() {
        let stat = Stat::new("Armour");
        assert_eq!(base_set(&[], &stat), Ok(None));
        assert_eq!(base_set(&[None, None], &stat), Ok(some(0.0)));
        assert_eq!(base_set(&[some(100.0)], &stat), Ok(some(100.0)));
    }

    #[test]
    fn test_base_set_component_writers() {
        let stat = Stat::new("Damage");
        // A zero contribution writes neither component
        let range = Some(NodeValue::new(5.0, 12.0));
        assert_eq!(
            base_set(&[range, Some(NodeValue::ZERO)], &stat),
            Ok(Some(NodeValue::new(5.0, 12.0)))
        );

        // Two writers conflict per component
        let result = base_set(&[some(100.0), some(50.0)], &stat);
        assert!(matches!(
            result,
            Err(CalcError::UnsupportedAggregation { .. })
        ));

        let result = base_set(&[range, Some(NodeValue::new(0.0, 3.0))], &stat);
        assert!(matches!(
            result,
            Err(CalcError::UnsupportedAggregation { .. })
        ));
    }
}
