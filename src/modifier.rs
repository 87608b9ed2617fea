//! Modifiers: the units of change applied to the calculation graph.
//!
//! A modifier is an immutable `(stats, form, value, source)` tuple. The form
//! decides which aggregation a contribution enters; the source decides which
//! path it lands on. Modifiers are added and removed by equality, not by
//! handle: adding the same modifier twice contributes twice, and each
//! addition needs its own removal to cancel.

use crate::calculation::Value;
use crate::node_type::NodeType;
use crate::stat::Stat;
use serde::{Deserialize, Serialize};

/// The aggregation role of a modifier's contribution.
///
/// The alias forms (`BaseSubtract`, `PercentReduce`, `PercentLess`,
/// `PercentIncrease`, `PercentMore`) canonicalize onto the same aggregation
/// node as their base form, with a sign flip where the name implies one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Form {
    /// Set the base value ("has 100 base armour").
    BaseSet,
    /// Add to the base value ("+53 to Life").
    BaseAdd,
    /// Subtract from the base value; `BaseAdd` with a negated value.
    BaseSubtract,
    /// Additive percentage ("30% increased Damage").
    Increase,
    /// Alias of `Increase`.
    PercentIncrease,
    /// Negated `Increase` ("20% reduced Mana Cost").
    PercentReduce,
    /// Multiplicative percentage ("50% more Damage").
    More,
    /// Alias of `More`.
    PercentMore,
    /// Negated `More` ("10% less Damage taken").
    PercentLess,
    /// Override the combined base value.
    BaseOverride,
    /// Override the final total.
    TotalOverride,
}

impl Form {
    /// The aggregation node this form's contributions feed.
    pub fn node_type(self) -> NodeType {
        match self {
            Form::BaseSet => NodeType::BaseSet,
            Form::BaseAdd | Form::BaseSubtract => NodeType::BaseAdd,
            Form::Increase | Form::PercentIncrease | Form::PercentReduce => NodeType::Increase,
            Form::More | Form::PercentMore | Form::PercentLess => NodeType::More,
            Form::BaseOverride => NodeType::BaseOverride,
            Form::TotalOverride => NodeType::TotalOverride,
        }
    }

    /// `-1.0` for the negating alias forms, `1.0` otherwise.
    pub fn sign(self) -> f64 {
        match self {
            Form::BaseSubtract | Form::PercentReduce | Form::PercentLess => -1.0,
            _ => 1.0,
        }
    }
}

/// Where a modifier comes from.
///
/// Global modifiers aggregate on a stat's main path; local modifiers open a
/// path of their own, so that e.g. "more" multipliers printed on an item
/// scale only that item's contribution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModifierSource {
    Global,
    Local(LocalSource),
}

impl ModifierSource {
    /// Shorthand for an item-local source.
    pub fn item(slot: impl Into<String>) -> Self {
        ModifierSource::Local(LocalSource::Item { slot: slot.into() })
    }

    /// Shorthand for a skill-local source.
    pub fn skill(id: impl Into<String>) -> Self {
        ModifierSource::Local(LocalSource::Skill { id: id.into() })
    }

    /// Shorthand for a passive-node-local source.
    pub fn passive_node(id: u16) -> Self {
        ModifierSource::Local(LocalSource::PassiveNode { id })
    }
}

/// The local variants of [`ModifierSource`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalSource {
    Item { slot: String },
    Gem,
    Skill { id: String },
    PassiveNode { id: u16 },
    Given,
}

impl std::fmt::Display for ModifierSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModifierSource::Global => write!(f, "Global"),
            ModifierSource::Local(LocalSource::Item { slot }) => write!(f, "Item({})", slot),
            ModifierSource::Local(LocalSource::Gem) => write!(f, "Gem"),
            ModifierSource::Local(LocalSource::Skill { id }) => write!(f, "Skill({})", id),
            ModifierSource::Local(LocalSource::PassiveNode { id }) => {
                write!(f, "PassiveNode({})", id)
            }
            ModifierSource::Local(LocalSource::Given) => write!(f, "Given"),
        }
    }
}

/// An immutable modifier.
///
/// Equality is structural on stats, form and source; the value is compared
/// by handle identity ([`Value`] handles are shared between the add and the
/// matching remove by the layer that builds them).
///
/// # Examples
///
/// ```rust
/// use modgraph::{Form, Modifier, ModifierSource, Stat, Value};
///
/// let life = Stat::new("Life");
/// let value = Value::constant(53.0);
/// let a = Modifier::new(vec![life.clone()], Form::BaseAdd, value.clone(), ModifierSource::Global);
/// let b = Modifier::new(vec![life], Form::BaseAdd, value, ModifierSource::Global);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct Modifier {
    stats: Vec<Stat>,
    form: Form,
    value: Value,
    source: ModifierSource,
    conversion_source: Option<Stat>,
}

impl Modifier {
    /// Create a modifier targeting one or more stats.
    ///
    /// `stats` must be nonempty.
    pub fn new(stats: Vec<Stat>, form: Form, value: Value, source: ModifierSource) -> Self {
        debug_assert!(!stats.is_empty(), "modifier must target at least one stat");
        Self {
            stats,
            form,
            value,
            source,
            conversion_source: None,
        }
    }

    /// Create a conversion modifier: `value` percent of `source_stat` is
    /// converted to `target_stat`.
    ///
    /// Adds a conversion path to the target stat whose base scales with the
    /// source stat's path totals (see the crate documentation on paths).
    pub fn conversion(
        source_stat: Stat,
        target_stat: Stat,
        value: Value,
        source: ModifierSource,
    ) -> Self {
        Self {
            stats: vec![target_stat],
            form: Form::BaseAdd,
            value,
            source,
            conversion_source: Some(source_stat),
        }
    }

    pub fn stats(&self) -> &[Stat] {
        &self.stats
    }

    pub fn form(&self) -> Form {
        self.form
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn source(&self) -> &ModifierSource {
        &self.source
    }

    /// The stat converted from, for conversion modifiers.
    pub fn conversion_source(&self) -> Option<&Stat> {
        self.conversion_source.as_ref()
    }
}

impl PartialEq for Modifier {
    fn eq(&self, other: &Self) -> bool {
        self.stats == other.stats
            && self.form == other.form
            && self.source == other.source
            && self.conversion_source == other.conversion_source
            && self.value.same_calculation(&other.value)
    }
}
