//! The calculator facade.
//!
//! A [`Calculator`] owns the calculation graph and is the only way to change
//! it: modifier additions and removals go through a [`BatchUpdate`], which
//! applies every mutation before any value is recomputed. After the
//! mutations land, the batch forces exactly one recomputation of each
//! subscribed node and fires change callbacks for those whose value
//! actually differs.
//!
//! # Examples
//!
//! ```rust
//! use modgraph::{Calculator, Form, ModifierSource, Stat, Value};
//!
//! let mut calculator = Calculator::new();
//! let life = Stat::new("Life");
//!
//! calculator
//!     .update()
//!     .add_stat(life.clone(), Form::BaseAdd, Value::constant(53.0), ModifierSource::Global)
//!     .add_stat(life.clone(), Form::Increase, Value::constant(100.0), ModifierSource::Global)
//!     .apply()?;
//!
//! assert_eq!(calculator.value(&life)?.map(|v| v.single()), Some(Some(106.0)));
//! # Ok::<(), modgraph::CalcError>(())
//! ```

use crate::error::CalcError;
use crate::graph::{CalculationGraph, NodeId};
use crate::modifier::{Form, Modifier, ModifierSource};
use crate::node_type::NodeType;
use crate::path::PathDefinition;
use crate::stat::Stat;
use crate::calculation::Value;
use crate::value::NodeValue;

/// Token identifying a change subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

type ChangeCallback = Box<dyn FnMut(&Stat, Option<NodeValue>)>;
type RegistrationCallback = Box<dyn FnMut(NodeId, &Stat)>;

/// Owns the calculation graph and serializes all access to it.
///
/// Values are recomputed lazily on read, except for subscribed nodes, which
/// every batch recomputes so that change callbacks fire promptly.
pub struct Calculator {
    graph: CalculationGraph,
    callbacks: Vec<(u64, ChangeCallback)>,
    next_subscription: u64,
    registered: Vec<(NodeId, Stat)>,
    registration_callbacks: Vec<RegistrationCallback>,
}

impl Default for Calculator {
    fn default() -> Self {
        Self::new()
    }
}

impl Calculator {
    pub fn new() -> Self {
        Self {
            graph: CalculationGraph::new(),
            callbacks: Vec::new(),
            next_subscription: 0,
            registered: Vec::new(),
            registration_callbacks: Vec::new(),
        }
    }

    /// Start a batch of modifier changes.
    pub fn update(&mut self) -> BatchUpdate<'_> {
        BatchUpdate {
            calculator: self,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// A stat's Total on the main path.
    pub fn value(&mut self, stat: &Stat) -> Result<Option<NodeValue>, CalcError> {
        self.node_value(stat, NodeType::Total, &PathDefinition::main())
    }

    /// A specific node's value.
    pub fn node_value(
        &mut self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, CalcError> {
        self.graph.node_value(stat, node_type, path, None)
    }

    /// A node's value by handle.
    pub fn value_of(&mut self, node: NodeId) -> Result<Option<NodeValue>, CalcError> {
        self.graph.evaluate_id(node)
    }

    /// Whether a boolean stat's Total is true. Null counts as false.
    pub fn is_true(&mut self, stat: &Stat) -> Result<bool, CalcError> {
        Ok(self.value(stat)?.map(|v| v.is_true()).unwrap_or(false))
    }

    /// The current paths of a stat.
    pub fn paths(&mut self, stat: &Stat) -> Vec<PathDefinition> {
        self.graph.paths_of(stat, None)
    }

    /// Handle to a node, creating it if needed.
    pub fn node(&mut self, stat: &Stat, node_type: NodeType, path: &PathDefinition) -> NodeId {
        self.graph.node(stat, node_type, path)
    }

    /// Subscribe to changes of a stat's Total on the main path.
    ///
    /// The callback fires at the end of any batch after which the node's
    /// value differs from its previous one. A node's very first evaluation
    /// to null does not count as a change.
    pub fn subscribe<F>(&mut self, stat: &Stat, callback: F) -> Subscription
    where
        F: FnMut(&Stat, Option<NodeValue>) + 'static,
    {
        self.subscribe_node(stat, NodeType::Total, &PathDefinition::main(), callback)
    }

    /// Subscribe to changes of an arbitrary node.
    pub fn subscribe_node<F>(
        &mut self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
        callback: F,
    ) -> Subscription
    where
        F: FnMut(&Stat, Option<NodeValue>) + 'static,
    {
        let id = self.next_subscription;
        self.next_subscription += 1;
        let node = self.graph.node(stat, node_type, path);
        self.graph.subscribe(node, id);
        self.callbacks.push((id, Box::new(callback)));
        Subscription(id)
    }

    /// Drop a subscription. The node becomes prunable again once nothing
    /// else holds it alive.
    pub fn unsubscribe(&mut self, subscription: Subscription) {
        for node in self.graph.subscribed_nodes() {
            self.graph.unsubscribe(node, subscription.0);
        }
        self.callbacks.retain(|(id, _)| *id != subscription.0);
    }

    /// Stats that requested explicit registration, in the order their
    /// graphs were created.
    pub fn registered_stats(&self) -> &[(NodeId, Stat)] {
        &self.registered
    }

    /// Called whenever a stat with explicit registration gets its graph,
    /// with the handle of its main-path Total node.
    pub fn on_registration<F>(&mut self, callback: F)
    where
        F: FnMut(NodeId, &Stat) + 'static,
    {
        self.registration_callbacks.push(Box::new(callback));
    }

    fn apply_batch(
        &mut self,
        added: Vec<Modifier>,
        removed: Vec<Modifier>,
    ) -> Result<(), CalcError> {
        // All mutations land before any recomputation
        let mut newly_registered = Vec::new();
        for modifier in &added {
            newly_registered.extend(self.graph.add_modifier(modifier));
        }
        for modifier in &removed {
            self.graph.remove_modifier(modifier);
        }

        // Force one recomputation of every subscribed node
        for node in self.graph.subscribed_nodes() {
            self.graph.evaluate_id(node)?;
        }
        for (stat, value, subscribers) in self.graph.drain_changes() {
            for subscriber in subscribers {
                if let Some((_, callback)) =
                    self.callbacks.iter_mut().find(|(id, _)| *id == subscriber)
                {
                    callback(&stat, value);
                }
            }
        }

        self.graph.prune();

        for stat in newly_registered {
            let node = self
                .graph
                .node(&stat, NodeType::Total, &PathDefinition::main());
            for callback in &mut self.registration_callbacks {
                callback(node, &stat);
            }
            self.registered.push((node, stat));
        }
        Ok(())
    }
}

/// A set of modifier additions and removals applied as one unit.
///
/// Dropping a batch without calling [`apply`](BatchUpdate::apply) discards
/// it.
#[must_use = "a batch does nothing until apply() is called"]
pub struct BatchUpdate<'a> {
    calculator: &'a mut Calculator,
    added: Vec<Modifier>,
    removed: Vec<Modifier>,
}

impl BatchUpdate<'_> {
    pub fn add(mut self, modifier: Modifier) -> Self {
        self.added.push(modifier);
        self
    }

    /// Shorthand for adding a single-stat modifier.
    pub fn add_stat(self, stat: Stat, form: Form, value: Value, source: ModifierSource) -> Self {
        self.add(Modifier::new(vec![stat], form, value, source))
    }

    pub fn remove(mut self, modifier: Modifier) -> Self {
        self.removed.push(modifier);
        self
    }

    /// Apply all queued changes, recompute subscribed nodes and fire change
    /// callbacks.
    pub fn apply(self) -> Result<(), CalcError> {
        let BatchUpdate {
            calculator,
            added,
            removed,
        } = self;
        calculator.apply_batch(added, removed)
    }
}
