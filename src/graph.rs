//! The calculation graph.
//!
//! One arena of calculation nodes, addressed by stable indices so that
//! pruning and cycle handling never touch raw pointers. Each node is the
//! lazily computed, cached value of one `(stat, node type, path)` triple;
//! dependency edges (dependency → dependent) are recorded while a node
//! evaluates and drive dirty propagation when modifiers change.
//!
//! Nodes move through three states:
//!
//! ```text
//! Dirty ──read──→ Evaluating ──success──→ Cached ──invalidation──→ Dirty
//!                     │
//!                     └─ re-entrant read (cycle): null sentinel, not cached
//! ```
//!
//! The sentinel keeps self-referential stat setups (a Minimum bound that
//! transitively depends on its own Total) from recursing forever; the outer
//! evaluation still completes and caches its real result.

use crate::aggregation;
use crate::behavior::Behavior;
use crate::calculation::Value;
use crate::error::CalcError;
use crate::modifier::{Form, Modifier};
use crate::node_type::NodeType;
use crate::path::PathDefinition;
use crate::stat::Stat;
use crate::value::{sum_where_some, NodeValue};
use log::{debug, warn};
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Stable handle to a calculation node.
///
/// Handles obtained while a node is alive stay valid across batches as long
/// as the node keeps a subscriber; a pruned node's handle is dead and a
/// fresh lookup may return a different handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) NodeIndex);

/// Identifies what a node in the arena computes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum NodeKey {
    /// A calculation node proper.
    Calc {
        stat: Stat,
        node_type: NodeType,
        path: PathDefinition,
    },
    /// Pseudo-node standing for "the set of paths of this stat"; carries no
    /// value but collects dependency edges from nodes that enumerated the
    /// path set, so path changes dirty them.
    PathSet { stat: Stat },
}

impl NodeKey {
    fn stat(&self) -> &Stat {
        match self {
            NodeKey::Calc { stat, .. } => stat,
            NodeKey::PathSet { stat } => stat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeStatus {
    Dirty,
    Evaluating,
    Cached,
}

struct NodeState {
    key: NodeKey,
    status: NodeStatus,
    value: Option<NodeValue>,
    /// Whether the node ever completed an evaluation; a first evaluation to
    /// null is not a change.
    evaluated: bool,
    subscribers: Vec<u64>,
}

/// One raw modifier contribution registered on a form node.
struct ModifierEntry {
    value: Value,
    sign: f64,
}

/// One conversion registered into a stat: `value` percent of `source_stat`
/// becomes base of this stat on the corresponding conversion paths.
struct ConversionEntry {
    source_stat: Stat,
    value: Value,
}

/// Per-stat modifier storage.
struct StatGraph {
    forms: HashMap<(NodeType, PathDefinition), Vec<ModifierEntry>>,
    conversions: Vec<ConversionEntry>,
    modifier_count: usize,
}

impl StatGraph {
    fn new() -> Self {
        Self {
            forms: HashMap::new(),
            conversions: Vec::new(),
            modifier_count: 0,
        }
    }
}

/// The full collection of stat graphs plus the modifier collection.
///
/// Owned by a [`Calculator`]; not thread-safe by design — one batch runs to
/// completion on one logical thread before the next begins.
///
/// [`Calculator`]: crate::Calculator
pub(crate) struct CalculationGraph {
    arena: StableDiGraph<NodeState, ()>,
    index: HashMap<NodeKey, NodeIndex>,
    stats: HashMap<Stat, StatGraph>,
    behaviors: Vec<Behavior>,
    changed: Vec<NodeIndex>,
}

impl CalculationGraph {
    pub(crate) fn new() -> Self {
        Self {
            arena: StableDiGraph::new(),
            index: HashMap::new(),
            stats: HashMap::new(),
            behaviors: Vec::new(),
            changed: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Modifier collection
    // ------------------------------------------------------------------

    /// Register a modifier. Returns the stats whose graphs were created by
    /// this call and want explicit registration.
    pub(crate) fn add_modifier(&mut self, modifier: &Modifier) -> Vec<Stat> {
        let mut registered = Vec::new();
        for stat in modifier.stats().to_vec() {
            if self.get_or_add_stat(&stat) && stat.explicit_registration().is_some() {
                registered.push(stat.clone());
            }
            match modifier.conversion_source() {
                Some(source_stat) => {
                    // The source's graph must exist for path enumeration
                    self.get_or_add_stat(source_stat);
                    if let Some(stat_graph) = self.stats.get_mut(&stat) {
                        stat_graph.conversions.push(ConversionEntry {
                            source_stat: source_stat.clone(),
                            value: modifier.value().clone(),
                        });
                        stat_graph.modifier_count += 1;
                    }
                    self.dirty_conversion_bases(&stat, source_stat);
                    self.dirty_path_set(&stat);
                }
                None => {
                    let (node_type, path) = Self::registration_slot(modifier);
                    if let Some(stat_graph) = self.stats.get_mut(&stat) {
                        stat_graph
                            .forms
                            .entry((node_type, path.clone()))
                            .or_default()
                            .push(ModifierEntry {
                                value: modifier.value().clone(),
                                sign: modifier.form().sign(),
                            });
                        stat_graph.modifier_count += 1;
                    }
                    self.dirty_form(&stat, node_type, &path);
                }
            }
        }
        registered
    }

    /// Remove one prior addition of an equal modifier.
    ///
    /// Removing a modifier that is not present is a caller error; the
    /// strict policy here is to warn and leave the graph untouched rather
    /// than corrupt contribution counts.
    pub(crate) fn remove_modifier(&mut self, modifier: &Modifier) {
        for stat in modifier.stats().to_vec() {
            let removed = match modifier.conversion_source() {
                Some(source_stat) => self.remove_conversion(&stat, source_stat, modifier.value()),
                None => self.remove_form_entry(&stat, modifier),
            };
            if !removed {
                warn!(
                    "removing modifier not present on {}: {:?} from {}",
                    stat,
                    modifier.form(),
                    modifier.source()
                );
            }
        }
    }

    fn remove_form_entry(&mut self, stat: &Stat, modifier: &Modifier) -> bool {
        let (node_type, path) = Self::registration_slot(modifier);
        let Some(stat_graph) = self.stats.get_mut(stat) else {
            return false;
        };
        let Some(entries) = stat_graph.forms.get_mut(&(node_type, path.clone())) else {
            return false;
        };
        let sign = modifier.form().sign();
        let Some(position) = entries
            .iter()
            .position(|e| e.sign == sign && e.value.same_calculation(modifier.value()))
        else {
            return false;
        };
        entries.remove(position);
        stat_graph.modifier_count -= 1;
        self.dirty_form(stat, node_type, &path);
        true
    }

    fn remove_conversion(&mut self, stat: &Stat, source_stat: &Stat, value: &Value) -> bool {
        let Some(stat_graph) = self.stats.get_mut(stat) else {
            return false;
        };
        let Some(position) = stat_graph
            .conversions
            .iter()
            .position(|c| &c.source_stat == source_stat && c.value.same_calculation(value))
        else {
            return false;
        };
        stat_graph.conversions.remove(position);
        stat_graph.modifier_count -= 1;
        self.dirty_conversion_bases(stat, source_stat);
        self.dirty_path_set(stat);
        true
    }

    /// Where a modifier's contributions are stored: the form's node type,
    /// on the path opened by the modifier's source. Total overrides always
    /// live on the main path.
    fn registration_slot(modifier: &Modifier) -> (NodeType, PathDefinition) {
        let node_type = modifier.form().node_type();
        let path = if modifier.form() == Form::TotalOverride {
            PathDefinition::main()
        } else {
            PathDefinition::source(modifier.source().clone())
        };
        (node_type, path)
    }

    /// `true` if the stat's graph was created by this call.
    fn get_or_add_stat(&mut self, stat: &Stat) -> bool {
        if self.stats.contains_key(stat) {
            return false;
        }
        self.stats.insert(stat.clone(), StatGraph::new());
        for behavior in stat.behaviors() {
            if !self.behaviors.contains(behavior) {
                self.dirty_behavior_matches(behavior);
                self.behaviors.push(behavior.clone());
            }
        }
        true
    }

    // ------------------------------------------------------------------
    // Invalidation
    // ------------------------------------------------------------------

    fn dirty_form(&mut self, stat: &Stat, node_type: NodeType, path: &PathDefinition) {
        // Main-path increase/more entries feed every path's aggregation
        if matches!(node_type, NodeType::Increase | NodeType::More) && path.is_main() {
            let matching: Vec<NodeIndex> = self
                .index
                .iter()
                .filter(|(key, _)| {
                    matches!(key, NodeKey::Calc { stat: s, node_type: nt, .. }
                        if s == stat && *nt == node_type)
                })
                .map(|(_, idx)| *idx)
                .collect();
            for idx in matching {
                self.mark_dirty(idx);
            }
        } else if let Some(&idx) = self.index.get(&NodeKey::Calc {
            stat: stat.clone(),
            node_type,
            path: path.clone(),
        }) {
            self.mark_dirty(idx);
        }
        if matches!(
            node_type,
            NodeType::BaseSet | NodeType::BaseAdd | NodeType::BaseOverride
        ) {
            self.dirty_path_set(stat);
        }
    }

    fn dirty_path_set(&mut self, stat: &Stat) {
        if let Some(&idx) = self.index.get(&NodeKey::PathSet { stat: stat.clone() }) {
            self.mark_dirty(idx);
        }
    }

    /// Dirty the base nodes of conversion paths fed by `source_stat`.
    fn dirty_conversion_bases(&mut self, stat: &Stat, source_stat: &Stat) {
        let matching: Vec<NodeIndex> = self
            .index
            .iter()
            .filter(|(key, _)| {
                matches!(key, NodeKey::Calc { stat: s, node_type: NodeType::Base, path }
                    if s == stat && path.conversions().first() == Some(source_stat))
            })
            .map(|(_, idx)| *idx)
            .collect();
        for idx in matching {
            self.mark_dirty(idx);
        }
    }

    fn dirty_behavior_matches(&mut self, behavior: &Behavior) {
        let matching: Vec<NodeIndex> = self
            .index
            .iter()
            .filter(|(key, _)| {
                matches!(key, NodeKey::Calc { stat, node_type, path }
                    if behavior.matches(stat, *node_type, path))
            })
            .map(|(_, idx)| *idx)
            .collect();
        for idx in matching {
            self.mark_dirty(idx);
        }
    }

    /// Mark a node and all transitive dependents dirty. Recomputation stays
    /// lazy; nothing is evaluated here.
    fn mark_dirty(&mut self, idx: NodeIndex) {
        let mut stack = vec![idx];
        while let Some(idx) = stack.pop() {
            let state = &mut self.arena[idx];
            if state.status == NodeStatus::Dirty {
                continue;
            }
            state.status = NodeStatus::Dirty;
            stack.extend(self.arena.neighbors_directed(idx, Direction::Outgoing));
        }
    }

    // ------------------------------------------------------------------
    // Node repository
    // ------------------------------------------------------------------

    fn ensure_node(&mut self, key: NodeKey) -> NodeIndex {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.arena.add_node(NodeState {
            key: key.clone(),
            status: NodeStatus::Dirty,
            value: None,
            evaluated: false,
            subscribers: Vec::new(),
        });
        self.index.insert(key, idx);
        idx
    }

    pub(crate) fn node(
        &mut self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> NodeId {
        NodeId(self.ensure_node(NodeKey::Calc {
            stat: stat.clone(),
            node_type,
            path: path.clone(),
        }))
    }

    pub(crate) fn subscribe(&mut self, node: NodeId, subscription: u64) {
        self.arena[node.0].subscribers.push(subscription);
    }

    pub(crate) fn unsubscribe(&mut self, node: NodeId, subscription: u64) {
        if let Some(state) = self.arena.node_weight_mut(node.0) {
            state.subscribers.retain(|&s| s != subscription);
        }
    }

    pub(crate) fn subscribed_nodes(&self) -> Vec<NodeId> {
        self.arena
            .node_indices()
            .filter(|&idx| !self.arena[idx].subscribers.is_empty())
            .map(NodeId)
            .collect()
    }

    /// Drain the nodes whose cached value changed since the last drain,
    /// with their subscribers.
    pub(crate) fn drain_changes(&mut self) -> Vec<(Stat, Option<NodeValue>, Vec<u64>)> {
        let changed = std::mem::take(&mut self.changed);
        let mut seen = HashSet::new();
        changed
            .into_iter()
            .filter(|idx| seen.insert(*idx))
            .filter_map(|idx| {
                let state = self.arena.node_weight(idx)?;
                (!state.subscribers.is_empty()).then(|| {
                    (
                        state.key.stat().clone(),
                        state.value,
                        state.subscribers.clone(),
                    )
                })
            })
            .collect()
    }

    // ------------------------------------------------------------------
    // Evaluation
    // ------------------------------------------------------------------

    /// Resolve and evaluate a node, recording a dependency edge when read
    /// on behalf of another node.
    pub(crate) fn node_value(
        &mut self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
        for_node: Option<NodeIndex>,
    ) -> Result<Option<NodeValue>, CalcError> {
        let idx = self.ensure_node(NodeKey::Calc {
            stat: stat.clone(),
            node_type,
            path: path.clone(),
        });
        if let Some(dependent) = for_node {
            self.add_dependency(idx, dependent);
        }
        self.evaluate(idx)
    }

    pub(crate) fn evaluate_id(&mut self, node: NodeId) -> Result<Option<NodeValue>, CalcError> {
        self.evaluate(node.0)
    }

    fn add_dependency(&mut self, dependency: NodeIndex, dependent: NodeIndex) {
        if self.arena.find_edge(dependency, dependent).is_none() {
            self.arena.add_edge(dependency, dependent, ());
        }
    }

    fn evaluate(&mut self, idx: NodeIndex) -> Result<Option<NodeValue>, CalcError> {
        match self.arena[idx].status {
            NodeStatus::Cached => Ok(self.arena[idx].value),
            // Re-entrant read: cycle. The sentinel is not cached as the
            // node's value; the outer evaluation completes normally.
            NodeStatus::Evaluating => Ok(None),
            NodeStatus::Dirty => {
                self.arena[idx].status = NodeStatus::Evaluating;
                self.clear_dependencies(idx);
                match self.compute(idx) {
                    Ok(value) => {
                        let state = &mut self.arena[idx];
                        let changed = if state.evaluated {
                            state.value != value
                        } else {
                            value.is_some()
                        };
                        state.value = value;
                        state.evaluated = true;
                        state.status = NodeStatus::Cached;
                        if changed {
                            self.changed.push(idx);
                        }
                        Ok(value)
                    }
                    Err(err) => {
                        // Failed evaluations stay dirty; the error travels
                        // to whoever triggered the read
                        self.arena[idx].status = NodeStatus::Dirty;
                        Err(err)
                    }
                }
            }
        }
    }

    fn clear_dependencies(&mut self, idx: NodeIndex) {
        let incoming: Vec<_> = self
            .arena
            .edges_directed(idx, Direction::Incoming)
            .map(|e| e.id())
            .collect();
        for edge in incoming {
            self.arena.remove_edge(edge);
        }
    }

    fn compute(&mut self, idx: NodeIndex) -> Result<Option<NodeValue>, CalcError> {
        let NodeKey::Calc {
            stat,
            node_type,
            path,
        } = self.arena[idx].key.clone()
        else {
            // Path-set pseudo-nodes carry no value
            return Ok(None);
        };
        let raw = match node_type {
            NodeType::BaseSet => {
                let contributions = self.form_contributions(idx, &stat, node_type, &path)?;
                aggregation::base_set(&contributions, &stat)?
            }
            NodeType::BaseAdd => {
                let contributions = self.form_contributions(idx, &stat, node_type, &path)?;
                aggregation::base_add(&contributions)
            }
            NodeType::BaseOverride | NodeType::TotalOverride => {
                let contributions = self.form_contributions(idx, &stat, node_type, &path)?;
                aggregation::override_(&contributions, &stat, node_type)?
            }
            NodeType::Increase => {
                let contributions = self.form_contributions(idx, &stat, node_type, &path)?;
                aggregation::increase(&contributions)
            }
            NodeType::More => {
                let contributions = self.form_contributions(idx, &stat, node_type, &path)?;
                aggregation::more(&contributions)
            }
            NodeType::Base => self.compute_base(idx, &stat, &path)?,
            NodeType::PathTotal => self.compute_path_total(idx, &stat, &path)?,
            NodeType::Subtotal => {
                let path_total = self.node_value(&stat, NodeType::PathTotal, &path, Some(idx))?;
                match path_total {
                    Some(value) => Some(self.clip(idx, &stat, value)?),
                    None => None,
                }
            }
            NodeType::Total => self.compute_total(idx, &stat)?,
        };
        self.apply_behaviors(idx, &stat, node_type, &path, raw)
    }

    /// Evaluate the modifier contributions feeding a form node.
    ///
    /// Increase and More nodes of non-main paths also aggregate the main
    /// path's entries: global percentages scale every path, while entries
    /// local to a path scale only that path.
    fn form_contributions(
        &mut self,
        idx: NodeIndex,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Vec<Option<NodeValue>>, CalcError> {
        let mut entries: Vec<(Value, f64)> = Vec::new();
        if let Some(stat_graph) = self.stats.get(stat) {
            if let Some(slot) = stat_graph.forms.get(&(node_type, path.clone())) {
                entries.extend(slot.iter().map(|e| (e.value.clone(), e.sign)));
            }
            if matches!(node_type, NodeType::Increase | NodeType::More) && !path.is_main() {
                if let Some(slot) = stat_graph.forms.get(&(node_type, PathDefinition::main())) {
                    entries.extend(slot.iter().map(|e| (e.value.clone(), e.sign)));
                }
            }
        }
        let mut contributions = Vec::with_capacity(entries.len());
        for (value, sign) in entries {
            let mut ctx = ValueContext {
                graph: self,
                node: idx,
                path: path.clone(),
            };
            let computed = value.calculate(&mut ctx)?;
            contributions.push(computed.map(|v| if sign < 0.0 { -v } else { v }));
        }
        Ok(contributions)
    }

    fn compute_base(
        &mut self,
        idx: NodeIndex,
        stat: &Stat,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, CalcError> {
        let base = if let Some(source_stat) = path.conversions().first().cloned() {
            self.compute_conversion_base(idx, stat, path, &source_stat)?
        } else {
            let override_value = self.node_value(stat, NodeType::BaseOverride, path, Some(idx))?;
            if override_value.is_some() {
                override_value
            } else {
                let set = self.node_value(stat, NodeType::BaseSet, path, Some(idx))?;
                let add = self.node_value(stat, NodeType::BaseAdd, path, Some(idx))?;
                match (set, add) {
                    (None, None) => None,
                    (set, add) => Some(
                        set.unwrap_or(NodeValue::ZERO) + add.unwrap_or(NodeValue::ZERO),
                    ),
                }
            }
        };
        Ok(match (base, stat.rounding()) {
            (Some(value), Some(rounding)) => Some(value.select(|v| rounding.apply(v))),
            (base, _) => base,
        })
    }

    /// Base of a conversion path: the summed conversion percentages of the
    /// leading conversion stat, applied to that stat's path total on the
    /// remainder of the chain.
    fn compute_conversion_base(
        &mut self,
        idx: NodeIndex,
        stat: &Stat,
        path: &PathDefinition,
        source_stat: &Stat,
    ) -> Result<Option<NodeValue>, CalcError> {
        let conversion_values: Vec<Value> = self
            .stats
            .get(stat)
            .map(|sg| {
                sg.conversions
                    .iter()
                    .filter(|c| &c.source_stat == source_stat)
                    .map(|c| c.value.clone())
                    .collect()
            })
            .unwrap_or_default();
        let mut percents = Vec::with_capacity(conversion_values.len());
        for value in conversion_values {
            let mut ctx = ValueContext {
                graph: self,
                node: idx,
                path: path.clone(),
            };
            percents.push(value.calculate(&mut ctx)?);
        }
        let Some(percent) = sum_where_some(percents) else {
            return Ok(None);
        };
        let remainder = path.conversion_remainder();
        let source_total =
            self.node_value(source_stat, NodeType::PathTotal, &remainder, Some(idx))?;
        Ok(source_total.map(|v| v * (percent / NodeValue::from(100.0))))
    }

    fn compute_path_total(
        &mut self,
        idx: NodeIndex,
        stat: &Stat,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, CalcError> {
        let Some(base) = self.node_value(stat, NodeType::Base, path, Some(idx))? else {
            // No base means the path has no effect, regardless of
            // increase/more contributions
            return Ok(None);
        };
        let increase = self
            .node_value(stat, NodeType::Increase, path, Some(idx))?
            .unwrap_or(NodeValue::ZERO);
        let more = self
            .node_value(stat, NodeType::More, path, Some(idx))?
            .unwrap_or(NodeValue::ONE);
        Ok(Some(base * (NodeValue::ONE + increase) * more))
    }

    fn compute_total(&mut self, idx: NodeIndex, stat: &Stat) -> Result<Option<NodeValue>, CalcError> {
        let override_value =
            self.node_value(stat, NodeType::TotalOverride, &PathDefinition::main(), Some(idx))?;
        if override_value.is_some() {
            return Ok(override_value);
        }
        let paths = self.paths_of(stat, Some(idx));
        let mut subtotals = Vec::with_capacity(paths.len());
        for path in paths {
            subtotals.push(self.node_value(stat, NodeType::Subtotal, &path, Some(idx))?);
        }
        match sum_where_some(subtotals) {
            Some(sum) => Ok(Some(self.clip(idx, stat, sum)?)),
            None => Ok(None),
        }
    }

    /// Clip a value against the stat's Minimum/Maximum stats' Totals.
    fn clip(
        &mut self,
        idx: NodeIndex,
        stat: &Stat,
        value: NodeValue,
    ) -> Result<NodeValue, CalcError> {
        let lower = match stat.minimum().cloned() {
            Some(bound) => {
                self.node_value(&bound, NodeType::Total, &PathDefinition::main(), Some(idx))?
            }
            None => None,
        };
        let upper = match stat.maximum().cloned() {
            Some(bound) => {
                self.node_value(&bound, NodeType::Total, &PathDefinition::main(), Some(idx))?
            }
            None => None,
        };
        Ok(value.clip(lower, upper))
    }

    fn apply_behaviors(
        &mut self,
        idx: NodeIndex,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
        raw: Option<NodeValue>,
    ) -> Result<Option<NodeValue>, CalcError> {
        let matching: Vec<Behavior> = self
            .behaviors
            .iter()
            .filter(|b| b.matches(stat, node_type, path))
            .cloned()
            .collect();
        let mut value = raw;
        for behavior in matching {
            let mut ctx = ValueContext {
                graph: self,
                node: idx,
                path: path.clone(),
            };
            value = behavior.transformation().apply(value, &mut ctx)?;
        }
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Paths
    // ------------------------------------------------------------------

    /// Enumerate a stat's current paths, recording path-set dependencies
    /// for the reading node.
    ///
    /// The dependency covers every stat traversed: a conversion target's
    /// path set changes when any stat along a conversion chain gains or
    /// loses a path.
    pub(crate) fn paths_of(&mut self, stat: &Stat, for_node: Option<NodeIndex>) -> Vec<PathDefinition> {
        let mut visited = HashSet::new();
        let paths = self.collect_paths(stat, &mut visited);
        if let Some(dependent) = for_node {
            for visited_stat in visited {
                let path_set = self.ensure_node(NodeKey::PathSet { stat: visited_stat });
                // Pseudo-nodes settle to Cached(None) so dirty propagation
                // has a transition to ride on
                self.arena[path_set].status = NodeStatus::Cached;
                self.arena[path_set].evaluated = true;
                self.add_dependency(path_set, dependent);
            }
        }
        paths
    }

    fn collect_paths(&self, stat: &Stat, visited: &mut HashSet<Stat>) -> Vec<PathDefinition> {
        let mut paths = vec![PathDefinition::main()];
        if !visited.insert(stat.clone()) {
            // Conversion cycle; stop chaining here
            return paths;
        }
        let Some(stat_graph) = self.stats.get(stat) else {
            return paths;
        };
        for ((node_type, path), entries) in &stat_graph.forms {
            let opens_path = matches!(
                node_type,
                NodeType::BaseSet | NodeType::BaseAdd | NodeType::BaseOverride
            );
            if opens_path && !entries.is_empty() && !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        let sources: Vec<Stat> = stat_graph
            .conversions
            .iter()
            .map(|c| c.source_stat.clone())
            .collect();
        for source_stat in sources {
            for source_path in self.collect_paths(&source_stat, visited) {
                let converted = source_path.converted_through(source_stat.clone());
                if !paths.contains(&converted) {
                    paths.push(converted);
                }
            }
        }
        paths
    }

    // ------------------------------------------------------------------
    // Pruning
    // ------------------------------------------------------------------

    /// Dispose stats with no modifiers, no subscribed nodes and no node
    /// that a live stat still depends on. Covers stats that only ever got
    /// arena nodes (a bound stat or a value reference without modifiers)
    /// as well as stat graphs whose last modifier was removed. Runs to a
    /// fixpoint so that chains of newly unreferenced stats fall together.
    pub(crate) fn prune(&mut self) {
        loop {
            let mut nodes_by_stat: HashMap<Stat, Vec<NodeIndex>> = HashMap::new();
            for (key, &idx) in &self.index {
                nodes_by_stat.entry(key.stat().clone()).or_default().push(idx);
            }
            let mut candidates: Vec<Stat> = self
                .stats
                .iter()
                .filter(|(_, sg)| sg.modifier_count == 0)
                .map(|(stat, _)| stat.clone())
                .collect();
            candidates.extend(
                nodes_by_stat
                    .keys()
                    .filter(|stat| !self.stats.contains_key(stat))
                    .cloned(),
            );
            let removable: Vec<Stat> = candidates
                .into_iter()
                .filter(|stat| {
                    nodes_by_stat.get(stat).map_or(true, |nodes| {
                        nodes.iter().all(|&idx| self.prunable(stat, idx))
                    })
                })
                .collect();
            if removable.is_empty() {
                break;
            }
            for stat in removable {
                debug!("pruning stat graph for {}", stat);
                if let Some(nodes) = nodes_by_stat.get(&stat) {
                    for &idx in nodes {
                        let key = self.arena[idx].key.clone();
                        self.index.remove(&key);
                        self.arena.remove_node(idx);
                    }
                }
                self.stats.remove(&stat);
            }
        }
    }

    fn prunable(&self, stat: &Stat, idx: NodeIndex) -> bool {
        let state = &self.arena[idx];
        if !state.subscribers.is_empty() {
            return false;
        }
        // A dependency edge into another stat's node means something live
        // read this node during its last evaluation
        self.arena
            .neighbors_directed(idx, Direction::Outgoing)
            .all(|dependent| self.arena[dependent].key.stat() == stat)
    }
}

/// The view a [`Value`] calculation gets of the graph.
///
/// Reads made through the context become dependency edges of the node being
/// evaluated, so later modifier changes dirty exactly the right nodes.
pub struct ValueContext<'a> {
    graph: &'a mut CalculationGraph,
    node: NodeIndex,
    path: PathDefinition,
}

impl ValueContext<'_> {
    /// The path of the node being evaluated.
    pub fn current_path(&self) -> &PathDefinition {
        &self.path
    }

    /// Read one node of a stat.
    pub fn value(
        &mut self,
        stat: &Stat,
        node_type: NodeType,
        path: &PathDefinition,
    ) -> Result<Option<NodeValue>, CalcError> {
        self.graph.node_value(stat, node_type, path, Some(self.node))
    }

    /// A stat's Total on the main path.
    pub fn stat_value(&mut self, stat: &Stat) -> Result<Option<NodeValue>, CalcError> {
        self.value(stat, NodeType::Total, &PathDefinition::main())
    }

    /// The stat's current paths.
    pub fn paths(&mut self, stat: &Stat) -> Vec<PathDefinition> {
        self.graph.paths_of(stat, Some(self.node))
    }

    /// Batched read of one node type across several stat-path pairs.
    ///
    /// Each underlying node is evaluated at most once per call, even when
    /// several pairs resolve to the same node.
    pub fn values(
        &mut self,
        node_type: NodeType,
        pairs: &[(Stat, PathDefinition)],
    ) -> Result<Vec<Option<NodeValue>>, CalcError> {
        pairs
            .iter()
            .map(|(stat, path)| self.value(stat, node_type, path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::ModifierSource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn add(graph: &mut CalculationGraph, stat: &Stat, form: Form, value: f64) -> Modifier {
        let modifier = Modifier::new(
            vec![stat.clone()],
            form,
            Value::constant(value),
            ModifierSource::Global,
        );
        graph.add_modifier(&modifier);
        modifier
    }

    fn total(graph: &mut CalculationGraph, stat: &Stat) -> Option<NodeValue> {
        graph
            .node_value(stat, NodeType::Total, &PathDefinition::main(), None)
            .unwrap()
    }

    #[test]
    fn test_total_without_modifiers_is_null() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Life");
        assert_eq!(total(&mut graph, &stat), None);
    }

    #[test]
    fn test_base_add_aggregation() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Life");
        add(&mut graph, &stat, Form::BaseAdd, 53.0);
        add(&mut graph, &stat, Form::BaseAdd, 270.0);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(323.0)));
    }

    #[test]
    fn test_increase_and_more() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Damage");
        add(&mut graph, &stat, Form::BaseSet, 100.0);
        add(&mut graph, &stat, Form::Increase, 50.0);
        add(&mut graph, &stat, Form::More, 20.0);
        // 100 × 1.5 × 1.2
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(180.0)));
    }

    #[test]
    fn test_increase_without_base_has_no_effect() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Damage");
        add(&mut graph, &stat, Form::Increase, 50.0);
        assert_eq!(total(&mut graph, &stat), None);
    }

    #[test]
    fn test_negating_alias_forms() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("ManaCost");
        add(&mut graph, &stat, Form::BaseSet, 40.0);
        add(&mut graph, &stat, Form::PercentReduce, 25.0);
        add(&mut graph, &stat, Form::BaseSubtract, 10.0);
        // (40 - 10) × (1 - 0.25)
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(22.5)));
    }

    #[test]
    fn test_base_override_beats_set_and_add() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Armour");
        add(&mut graph, &stat, Form::BaseSet, 100.0);
        add(&mut graph, &stat, Form::BaseAdd, 50.0);
        add(&mut graph, &stat, Form::BaseOverride, 40.0);
        add(&mut graph, &stat, Form::Increase, 100.0);
        // The override replaces the combined base; percentages still apply
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(80.0)));
    }

    #[test]
    fn test_total_override_wins() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Life");
        add(&mut graph, &stat, Form::BaseAdd, 100.0);
        add(&mut graph, &stat, Form::Increase, 100.0);
        add(&mut graph, &stat, Form::TotalOverride, 1.0);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(1.0)));
    }

    #[test]
    fn test_override_conflict_propagates() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Life");
        add(&mut graph, &stat, Form::BaseOverride, 40.0);
        add(&mut graph, &stat, Form::BaseOverride, 60.0);
        let result = graph.node_value(&stat, NodeType::Total, &PathDefinition::main(), None);
        assert!(matches!(
            result,
            Err(CalcError::UnsupportedAggregation { .. })
        ));
    }

    #[test]
    fn test_cache_and_invalidation() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Life");
        let modifier = add(&mut graph, &stat, Form::BaseAdd, 100.0);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(100.0)));

        add(&mut graph, &stat, Form::BaseAdd, 50.0);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(150.0)));

        graph.remove_modifier(&modifier);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(50.0)));
    }

    #[test]
    fn test_remove_absent_modifier_is_noop() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Life");
        add(&mut graph, &stat, Form::BaseAdd, 100.0);
        let never_added = Modifier::new(
            vec![stat.clone()],
            Form::BaseAdd,
            Value::constant(100.0),
            ModifierSource::Global,
        );
        graph.remove_modifier(&never_added);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(100.0)));
    }

    #[test]
    fn test_clip_against_bound_stats() {
        let mut graph = CalculationGraph::new();
        let minimum = Stat::new("Resist.Minimum");
        let maximum = Stat::new("Resist.Maximum");
        let resist = Stat::builder("Resist")
            .minimum(minimum.clone())
            .maximum(maximum.clone())
            .build();
        add(&mut graph, &minimum, Form::BaseAdd, 10.0);
        add(&mut graph, &maximum, Form::BaseAdd, 20.0);

        let raw = add(&mut graph, &resist, Form::BaseAdd, 5.0);
        assert_eq!(total(&mut graph, &resist), Some(NodeValue::from(10.0)));

        graph.remove_modifier(&raw);
        add(&mut graph, &resist, Form::BaseAdd, 15.0);
        assert_eq!(total(&mut graph, &resist), Some(NodeValue::from(15.0)));

        add(&mut graph, &resist, Form::BaseAdd, 10.0);
        assert_eq!(total(&mut graph, &resist), Some(NodeValue::from(20.0)));
    }

    #[test]
    fn test_self_referential_bound_degrades_to_unbounded() {
        let mut graph = CalculationGraph::new();
        // A stat whose Minimum is itself: the cycle guard returns the null
        // sentinel for the bound, leaving the total unclipped
        let stat = Stat::builder("Strange").minimum(Stat::new("Strange")).build();
        add(&mut graph, &stat, Form::BaseAdd, 7.0);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(7.0)));
    }

    #[test]
    fn test_local_source_opens_path() {
        let mut graph = CalculationGraph::new();
        let armour = Stat::new("Armour");
        let body = Modifier::new(
            vec![armour.clone()],
            Form::BaseSet,
            Value::constant(1000.0),
            ModifierSource::item("BodyArmour"),
        );
        let shield = Modifier::new(
            vec![armour.clone()],
            Form::BaseSet,
            Value::constant(500.0),
            ModifierSource::item("Shield"),
        );
        graph.add_modifier(&body);
        graph.add_modifier(&shield);
        // Two base-set writers coexist on separate paths
        assert_eq!(total(&mut graph, &armour), Some(NodeValue::from(1500.0)));

        let paths = graph.paths_of(&armour, None);
        assert_eq!(paths.len(), 3); // main + two item paths
    }

    #[test]
    fn test_conversion_path() {
        let mut graph = CalculationGraph::new();
        let physical = Stat::new("Physical.Damage");
        let fire = Stat::new("Fire.Damage");
        add(&mut graph, &physical, Form::BaseSet, 100.0);
        let conversion = Modifier::conversion(
            physical.clone(),
            fire.clone(),
            Value::constant(30.0),
            ModifierSource::Global,
        );
        graph.add_modifier(&conversion);
        assert_eq!(total(&mut graph, &fire), Some(NodeValue::from(30.0)));

        // Increases on the target apply to converted value too
        add(&mut graph, &fire, Form::Increase, 100.0);
        assert_eq!(total(&mut graph, &fire), Some(NodeValue::from(60.0)));
    }

    #[test]
    fn test_batched_values_evaluate_each_node_once() {
        let mut graph = CalculationGraph::new();
        let dexterity = Stat::new("Dexterity");
        let accuracy = Stat::new("Accuracy");

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let counted = Value::from_fn("counted 100", move |_ctx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(NodeValue::from(100.0)))
        });
        graph.add_modifier(&Modifier::new(
            vec![dexterity.clone()],
            Form::BaseAdd,
            counted,
            ModifierSource::Global,
        ));

        let read = dexterity.clone();
        let batched = Value::from_fn("dexterity twice", move |ctx| {
            let pair = (read.clone(), PathDefinition::main());
            let values = ctx.values(NodeType::Total, &[pair.clone(), pair])?;
            Ok(sum_where_some(values))
        });
        graph.add_modifier(&Modifier::new(
            vec![accuracy.clone()],
            Form::BaseAdd,
            batched,
            ModifierSource::Global,
        ));

        // Both reads resolve to the same cached node
        assert_eq!(total(&mut graph, &accuracy), Some(NodeValue::from(200.0)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_conversion_carries_local_source_paths() {
        let mut graph = CalculationGraph::new();
        let physical = Stat::new("Physical.Damage");
        let fire = Stat::new("Fire.Damage");
        let weapon_base = Modifier::new(
            vec![physical.clone()],
            Form::BaseSet,
            Value::constant(1000.0),
            ModifierSource::item("Weapon"),
        );
        graph.add_modifier(&weapon_base);
        graph.add_modifier(&Modifier::conversion(
            physical.clone(),
            fire.clone(),
            Value::constant(50.0),
            ModifierSource::Global,
        ));

        // The weapon-local path converts through a weapon-local path
        assert_eq!(total(&mut graph, &physical), Some(NodeValue::from(1000.0)));
        assert_eq!(total(&mut graph, &fire), Some(NodeValue::from(500.0)));

        // Percentages local to the source's path scale its converted value
        let weapon_more = Modifier::new(
            vec![physical.clone()],
            Form::More,
            Value::constant(100.0),
            ModifierSource::item("Weapon"),
        );
        graph.add_modifier(&weapon_more);
        assert_eq!(total(&mut graph, &fire), Some(NodeValue::from(1000.0)));
    }

    #[test]
    fn test_pruning_removes_modifier_less_stats() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Life");
        let modifier = add(&mut graph, &stat, Form::BaseAdd, 100.0);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(100.0)));

        graph.remove_modifier(&modifier);
        graph.prune();
        assert!(!graph.stats.contains_key(&stat));
    }

    #[test]
    fn test_pruning_collects_unmodified_referenced_stats() {
        let mut graph = CalculationGraph::new();
        let accuracy = Stat::new("Accuracy");
        let dexterity = Stat::new("Dexterity");
        let reference = Modifier::new(
            vec![accuracy.clone()],
            Form::BaseAdd,
            Value::from_stat(dexterity.clone()),
            ModifierSource::Global,
        );
        graph.add_modifier(&reference);

        // Dexterity never gets modifiers, but reading it created its nodes;
        // the live reference keeps them
        assert_eq!(total(&mut graph, &accuracy), None);
        graph.prune();
        assert!(graph.index.keys().any(|key| key.stat() == &dexterity));

        graph.remove_modifier(&reference);
        graph.prune();
        assert!(graph.index.is_empty());
        assert!(graph.stats.is_empty());
    }

    #[test]
    fn test_pruning_keeps_subscribed_stats() {
        let mut graph = CalculationGraph::new();
        let stat = Stat::new("Life");
        let modifier = add(&mut graph, &stat, Form::BaseAdd, 100.0);
        let node = graph.node(&stat, NodeType::Total, &PathDefinition::main());
        graph.subscribe(node, 1);
        assert_eq!(total(&mut graph, &stat), Some(NodeValue::from(100.0)));

        graph.remove_modifier(&modifier);
        graph.prune();
        assert!(graph.stats.contains_key(&stat));
        // The subscribed handle stays valid and recomputes to null
        assert_eq!(graph.evaluate_id(node).unwrap(), None);
    }
}
