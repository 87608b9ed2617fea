//! Computation paths.
//!
//! A path is one route by which a stat accumulates value. The main path
//! carries global modifiers; each local modifier source opens a path of its
//! own, and damage conversion opens paths keyed by the chain of stats the
//! value was converted through. Path totals are summed into the stat's
//! Total, so a "more" multiplier local to one item scales only that item's
//! contribution.

use crate::modifier::ModifierSource;
use crate::stat::Stat;

/// Identifies one computation path of a stat.
///
/// Two paths are equal iff their source and conversion chain are equal.
///
/// # Examples
///
/// ```rust
/// use modgraph::{ModifierSource, PathDefinition, Stat};
///
/// let main = PathDefinition::main();
/// assert!(main.is_main());
///
/// let physical = Stat::new("Physical.Damage");
/// let converted = PathDefinition::conversion(vec![physical]);
/// assert!(!converted.is_main());
/// assert!(!converted.conversions().is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathDefinition {
    source: ModifierSource,
    conversions: Vec<Stat>,
}

impl PathDefinition {
    /// The main path: global source, no conversions.
    pub fn main() -> Self {
        Self {
            source: ModifierSource::Global,
            conversions: Vec::new(),
        }
    }

    /// The path for a modifier source, without conversions.
    pub fn source(source: ModifierSource) -> Self {
        Self {
            source,
            conversions: Vec::new(),
        }
    }

    /// A conversion path: the stats the value was converted through, most
    /// recent first.
    pub fn conversion(conversions: Vec<Stat>) -> Self {
        Self {
            source: ModifierSource::Global,
            conversions,
        }
    }

    pub fn modifier_source(&self) -> &ModifierSource {
        &self.source
    }

    /// The conversion chain; empty for direct (non-conversion) paths.
    pub fn conversions(&self) -> &[Stat] {
        &self.conversions
    }

    pub fn is_main(&self) -> bool {
        self.source == ModifierSource::Global && self.conversions.is_empty()
    }

    /// Extend a source stat's path into the path it produces on the
    /// conversion target.
    ///
    /// The modifier source carries over: a source stat whose base sits on
    /// an item-local path converts through an item-local path, so its
    /// contribution is not conflated with conversions of the main path.
    pub(crate) fn converted_through(&self, source_stat: Stat) -> Self {
        let mut conversions = Vec::with_capacity(self.conversions.len() + 1);
        conversions.push(source_stat);
        conversions.extend(self.conversions.iter().cloned());
        Self {
            source: self.source.clone(),
            conversions,
        }
    }

    /// The source stat's path this conversion path draws from: the leading
    /// conversion stat dropped, source kept.
    pub(crate) fn conversion_remainder(&self) -> Self {
        Self {
            source: self.source.clone(),
            conversions: self.conversions.iter().skip(1).cloned().collect(),
        }
    }
}

impl Default for PathDefinition {
    fn default() -> Self {
        Self::main()
    }
}
