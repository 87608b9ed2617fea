//! # modgraph
//!
//! A reactive calculation graph for character stats.
//!
//! The crate computes stat totals from a collection of modifiers ("+53 to
//! Life", "42% increased Armour", "30% of Physical Damage converted to
//! Fire") and keeps them up to date as modifiers come and go. Values are
//! computed lazily, cached per node, and invalidated precisely: changing a
//! modifier dirties exactly the nodes whose last evaluation depended on it.
//!
//! ## The aggregation pipeline
//!
//! Each stat's value is built in stages, per computation path:
//!
//! ```text
//! BaseSet ─┐
//! BaseAdd ─┴→ Base ──→ PathTotal ──→ Subtotal ──→ Total
//! BaseOverride ↗        ↑ ↑                        ↑
//!              Increase ┘ └ More       TotalOverride
//! ```
//!
//! `Base` is the overriding or summed base, rounded per the stat.
//! `PathTotal` is `Base × (1 + Increase) × More`; `Increase` contributions
//! sum while `More` contributions multiply. `Subtotal` clips a path total
//! against the stat's Minimum/Maximum stats, and `Total` is the clipped sum
//! of all subtotals unless a `TotalOverride` wins.
//!
//! ## Paths
//!
//! Global modifiers aggregate on the main path. Modifiers from a local
//! source (an item, a skill gem) open a path of their own, so percentages
//! printed on an item scale only that item's contribution; global
//! percentages apply on every path. Damage conversion opens further paths
//! keyed by the chain of stats the value was converted through.
//!
//! ## Usage
//!
//! All changes go through a [`Calculator`] batch:
//!
//! ```rust
//! use modgraph::{Calculator, Form, ModifierSource, Stat, Value};
//!
//! let mut calculator = Calculator::new();
//! let armour = Stat::new("Armour");
//!
//! calculator
//!     .update()
//!     .add_stat(
//!         armour.clone(),
//!         Form::BaseSet,
//!         Value::constant(1000.0),
//!         ModifierSource::item("BodyArmour"),
//!     )
//!     .add_stat(
//!         armour.clone(),
//!         Form::Increase,
//!         Value::constant(42.0),
//!         ModifierSource::Global,
//!     )
//!     .apply()?;
//!
//! assert_eq!(calculator.value(&armour)?.map(|v| v.single()), Some(Some(1420.0)));
//! # Ok::<(), modgraph::CalcError>(())
//! ```
//!
//! Subscribe to a stat to be told when a batch changed it:
//!
//! ```rust
//! use modgraph::{Calculator, Stat};
//!
//! let mut calculator = Calculator::new();
//! let life = Stat::new("Life");
//! calculator.subscribe(&life, |stat, value| {
//!     println!("{} is now {:?}", stat, value);
//! });
//! ```
//!
//! ## Null values
//!
//! Every node's value is an `Option<NodeValue>`: `None` means "nothing
//! contributes here" and is distinct from zero. A stat without base
//! modifiers has a null Total no matter how many percentages apply to it.

mod aggregation;
mod behavior;
mod calculation;
mod calculator;
mod error;
mod graph;
mod modifier;
mod node_type;
mod path;
mod stat;
mod value;

pub use behavior::{Behavior, PathInteraction, Transformation};
pub use calculation::{Value, ValueCalculation};
pub use calculator::{BatchUpdate, Calculator, Subscription};
pub use error::CalcError;
pub use graph::{NodeId, ValueContext};
pub use modifier::{Form, LocalSource, Modifier, ModifierSource};
pub use node_type::NodeType;
pub use path::PathDefinition;
pub use stat::{DataType, Entity, ExplicitRegistration, Rounding, Stat, StatBuilder};
pub use value::NodeValue;
