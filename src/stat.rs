//! Stat identities.
//!
//! A `Stat` names a single computed quantity ("Life", "CriticalStrike.Chance")
//! scoped to an entity. Stats are produced by the builder layer outside this
//! crate; the engine only relies on their identity being stable. Two stats
//! are the same node-identity-wise iff their identity string and entity are
//! equal, so the payload is shared behind an `Arc` and clones are cheap.

use crate::behavior::Behavior;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The entity a stat belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entity {
    Character,
    Totem,
    Minion,
    Enemy,
}

/// How a stat's numeric value is to be interpreted.
///
/// Everything is carried as `f64`; `Int` and `Bool` are conventions for
/// consumers (booleans use nonzero-as-true, see [`NodeValue::is_true`]).
///
/// [`NodeValue::is_true`]: crate::NodeValue::is_true
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Double,
    Int,
    Bool,
}

/// Rounding applied to a stat's combined base value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rounding {
    Nearest,
    Up,
    Down,
}

impl Rounding {
    pub fn apply(self, value: f64) -> f64 {
        match self {
            Rounding::Nearest => value.round(),
            Rounding::Up => value.ceil(),
            Rounding::Down => value.floor(),
        }
    }
}

/// Why a stat wants to be surfaced to consumers when its graph is created.
///
/// Explicitly registered stats are reported through
/// [`Calculator::on_registration`] so a UI can discover inputs it must
/// supply (user-entered condition values) or actions it must track.
///
/// [`Calculator::on_registration`]: crate::Calculator::on_registration
#[derive(Debug, Clone, PartialEq)]
pub enum ExplicitRegistration {
    /// The consumer provides the value directly; carries the default.
    UserSpecifiedValue(f64),
    /// The stat reacts to a game action ("gain 10 rage on hit").
    GainOnAction { action: String },
}

#[derive(Debug)]
struct StatData {
    identity: String,
    entity: Entity,
    data_type: DataType,
    minimum: Option<Stat>,
    maximum: Option<Stat>,
    rounding: Option<Rounding>,
    explicit_registration: Option<ExplicitRegistration>,
    behaviors: Vec<Behavior>,
}

/// A stat identity.
///
/// # Examples
///
/// ```rust
/// use modgraph::{Entity, Stat};
///
/// let life = Stat::new("Life");
/// let enemy_life = Stat::builder("Life").entity(Entity::Enemy).build();
///
/// assert_eq!(life, Stat::new("Life"));
/// assert_ne!(life, enemy_life);
/// ```
#[derive(Debug, Clone)]
pub struct Stat(Arc<StatData>);

impl Stat {
    /// A plain `Double` character stat with no bounds or behaviors.
    pub fn new(identity: impl Into<String>) -> Self {
        Self::builder(identity).build()
    }

    /// Start building a stat with non-default properties.
    pub fn builder(identity: impl Into<String>) -> StatBuilder {
        StatBuilder {
            identity: identity.into(),
            entity: Entity::Character,
            data_type: DataType::Double,
            minimum: None,
            maximum: None,
            rounding: None,
            explicit_registration: None,
            behaviors: Vec::new(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.0.identity
    }

    pub fn entity(&self) -> Entity {
        self.0.entity
    }

    pub fn data_type(&self) -> DataType {
        self.0.data_type
    }

    /// The stat whose Total clips this stat from below, if any.
    pub fn minimum(&self) -> Option<&Stat> {
        self.0.minimum.as_ref()
    }

    /// The stat whose Total clips this stat from above, if any.
    pub fn maximum(&self) -> Option<&Stat> {
        self.0.maximum.as_ref()
    }

    pub fn rounding(&self) -> Option<Rounding> {
        self.0.rounding
    }

    pub fn explicit_registration(&self) -> Option<&ExplicitRegistration> {
        self.0.explicit_registration.as_ref()
    }

    /// Behaviors attached when this stat's subgraph is created.
    pub fn behaviors(&self) -> &[Behavior] {
        &self.0.behaviors
    }
}

impl PartialEq for Stat {
    fn eq(&self, other: &Self) -> bool {
        self.0.identity == other.0.identity && self.0.entity == other.0.entity
    }
}

impl Eq for Stat {}

impl Hash for Stat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.identity.hash(state);
        self.0.entity.hash(state);
    }
}

impl From<&str> for Stat {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl std::fmt::Display for Stat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}.{}", self.0.entity, self.0.identity)
    }
}

/// Builder for stats with bounds, rounding, registration or behaviors.
///
/// # Examples
///
/// ```rust
/// use modgraph::{DataType, Rounding, Stat};
///
/// let min = Stat::new("Resistance.Minimum");
/// let max = Stat::new("Resistance.Maximum");
/// let resistance = Stat::builder("Resistance")
///     .data_type(DataType::Int)
///     .rounding(Rounding::Down)
///     .minimum(min)
///     .maximum(max)
///     .build();
///
/// assert_eq!(resistance.identity(), "Resistance");
/// ```
pub struct StatBuilder {
    identity: String,
    entity: Entity,
    data_type: DataType,
    minimum: Option<Stat>,
    maximum: Option<Stat>,
    rounding: Option<Rounding>,
    explicit_registration: Option<ExplicitRegistration>,
    behaviors: Vec<Behavior>,
}

impl StatBuilder {
    pub fn entity(mut self, entity: Entity) -> Self {
        self.entity = entity;
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = data_type;
        self
    }

    pub fn minimum(mut self, stat: Stat) -> Self {
        self.minimum = Some(stat);
        self
    }

    pub fn maximum(mut self, stat: Stat) -> Self {
        self.maximum = Some(stat);
        self
    }

    pub fn rounding(mut self, rounding: Rounding) -> Self {
        self.rounding = Some(rounding);
        self
    }

    pub fn explicit_registration(mut self, registration: ExplicitRegistration) -> Self {
        self.explicit_registration = Some(registration);
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behaviors.push(behavior);
        self
    }

    pub fn build(self) -> Stat {
        Stat(Arc::new(StatData {
            identity: self.identity,
            entity: self.entity,
            data_type: self.data_type,
            minimum: self.minimum,
            maximum: self.maximum,
            rounding: self.rounding,
            explicit_registration: self.explicit_registration,
            behaviors: self.behaviors,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_by_identity_and_entity() {
        let a = Stat::new("Life");
        let b = Stat::new("Life");
        let c = Stat::builder("Life").entity(Entity::Minion).build();

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_equality_ignores_metadata() {
        let plain = Stat::new("Armour");
        let bounded = Stat::builder("Armour")
            .minimum(Stat::new("Armour.Minimum"))
            .rounding(Rounding::Nearest)
            .build();

        // Same logical stat, even though one carries bounds
        assert_eq!(plain, bounded);
    }

    #[test]
    fn test_builder_properties() {
        let min = Stat::new("Chance.Minimum");
        let stat = Stat::builder("Chance")
            .data_type(DataType::Int)
            .minimum(min.clone())
            .rounding(Rounding::Up)
            .build();

        assert_eq!(stat.data_type(), DataType::Int);
        assert_eq!(stat.minimum(), Some(&min));
        assert_eq!(stat.maximum(), None);
        assert_eq!(stat.rounding(), Some(Rounding::Up));
    }

    #[test]
    fn test_rounding_modes() {
        assert_eq!(Rounding::Nearest.apply(1.5), 2.0);
        assert_eq!(Rounding::Up.apply(16.4), 17.0);
        assert_eq!(Rounding::Down.apply(16.9), 16.0);
    }

    #[test]
    fn test_display() {
        let stat = Stat::builder("Life").entity(Entity::Enemy).build();
        assert_eq!(stat.to_string(), "Enemy.Life");
    }
}
