//! Behaviors: declarative value transformations attached to stats.
//!
//! A behavior rides along on a `Stat` and rewrites the values of matching
//! calculation nodes, e.g. "effectiveness of added damage" scaling every
//! `BaseAdd` node of the damage stats, or rounding a final total. Behaviors
//! are registered when the carrying stat's subgraph is created and are
//! deduplicated by equality, so re-adding the same stat never stacks its
//! behaviors.

use crate::error::CalcError;
use crate::graph::ValueContext;
use crate::node_type::NodeType;
use crate::path::PathDefinition;
use crate::stat::Stat;
use crate::value::NodeValue;
use std::sync::Arc;

/// Which paths of a matching node type a behavior applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathInteraction {
    All,
    MainOnly,
    ConversionOnly,
}

impl PathInteraction {
    fn matches(self, path: &PathDefinition) -> bool {
        match self {
            PathInteraction::All => true,
            PathInteraction::MainOnly => path.is_main(),
            PathInteraction::ConversionOnly => !path.conversions().is_empty(),
        }
    }
}

type TransformFn =
    dyn Fn(Option<NodeValue>, &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError>
        + Send
        + Sync;

/// Rewrites a node's computed value.
///
/// The closure receives the untransformed value and the evaluating node's
/// context, so a transformation may read other stats (those reads become
/// dependencies like any other). Equality is by handle identity.
#[derive(Clone)]
pub struct Transformation {
    description: String,
    f: Arc<TransformFn>,
}

impl Transformation {
    pub fn new<F>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<NodeValue>, &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            description: description.into(),
            f: Arc::new(f),
        }
    }

    /// A transformation that maps both bounds of a present value.
    pub fn select(description: impl Into<String>, f: fn(f64) -> f64) -> Self {
        Self::new(description, move |value, _ctx| Ok(value.map(|v| v.select(f))))
    }

    pub fn apply(
        &self,
        value: Option<NodeValue>,
        ctx: &mut ValueContext<'_>,
    ) -> Result<Option<NodeValue>, CalcError> {
        (self.f)(value, ctx)
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Transformation {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.f, &other.f)
    }
}

impl std::fmt::Debug for Transformation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transformation({})", self.description)
    }
}

/// A transformation plus the node set it applies to.
///
/// # Examples
///
/// ```rust
/// use modgraph::{Behavior, NodeType, PathInteraction, Stat, Transformation};
///
/// let damage = Stat::new("Fire.Damage");
/// let double_added = Behavior::new(
///     vec![damage],
///     vec![NodeType::BaseAdd],
///     PathInteraction::All,
///     Transformation::select("double", |v| v * 2.0),
/// );
/// assert_eq!(double_added.node_types(), &[NodeType::BaseAdd]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Behavior {
    affected_stats: Vec<Stat>,
    node_types: Vec<NodeType>,
    path_interaction: PathInteraction,
    transformation: Transformation,
}

impl Behavior {
    pub fn new(
        affected_stats: Vec<Stat>,
        node_types: Vec<NodeType>,
        path_interaction: PathInteraction,
        transformation: Transformation,
    ) -> Self {
        Self {
            affected_stats,
            node_types,
            path_interaction,
            transformation,
        }
    }

    pub fn affected_stats(&self) -> &[Stat] {
        &self.affected_stats
    }

    pub fn node_types(&self) -> &[NodeType] {
        &self.node_types
    }

    pub fn path_interaction(&self) -> PathInteraction {
        self.path_interaction
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub(crate) fn matches(&self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> bool {
        self.affected_stats.contains(stat)
            && self.node_types.contains(&node_type)
            && self.path_interaction.matches(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::ModifierSource;

    fn rounding_behavior(stat: Stat) -> Behavior {
        Behavior::new(
            vec![stat],
            vec![NodeType::Total],
            PathInteraction::MainOnly,
            Transformation::select("round", f64::round),
        )
    }

    #[test]
    fn test_matching() {
        let life = Stat::new("Life");
        let behavior = rounding_behavior(life.clone());

        assert!(behavior.matches(&life, NodeType::Total, &PathDefinition::main()));
        assert!(!behavior.matches(&life, NodeType::Base, &PathDefinition::main()));
        assert!(!behavior.matches(&Stat::new("Mana"), NodeType::Total, &PathDefinition::main()));
        assert!(!behavior.matches(
            &life,
            NodeType::Total,
            &PathDefinition::source(ModifierSource::item("Helmet"))
        ));
    }

    #[test]
    fn test_conversion_only_interaction() {
        let physical = Stat::new("Physical.Damage");
        let conversion_path = PathDefinition::conversion(vec![physical.clone()]);

        assert!(PathInteraction::ConversionOnly.matches(&conversion_path));
        assert!(!PathInteraction::ConversionOnly.matches(&PathDefinition::main()));
        assert!(PathInteraction::All.matches(&conversion_path));
    }

    #[test]
    fn test_equality_by_transformation_handle() {
        let life = Stat::new("Life");
        let a = rounding_behavior(life.clone());
        let b = a.clone();
        let c = rounding_behavior(life);

        assert_eq!(a, b);
        // Same shape, distinct transformation handle
        assert_ne!(a, c);
    }
}
