//! Lazily evaluated values.
//!
//! Every modifier carries a [`Value`]: a pure function from the calculation
//! graph (exposed as [`ValueContext`]) to an optional [`NodeValue`]. Values
//! must be referentially transparent — calling them twice against an
//! unchanged graph must yield the same result — because nodes cache what
//! they compute.
//!
//! [`ValueContext`]: crate::graph::ValueContext

use crate::error::CalcError;
use crate::graph::ValueContext;
use crate::node_type::NodeType;
use crate::path::PathDefinition;
use crate::stat::Stat;
use crate::value::NodeValue;
use std::sync::Arc;

/// A pure calculation from graph state to an optional value.
///
/// Implementations read other nodes through the context; the graph records
/// those reads as dependency edges, so an implementation must not cache
/// node values across calls itself.
pub trait ValueCalculation: Send + Sync {
    /// Compute the value against the current graph state.
    fn calculate(&self, ctx: &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError>;

    /// Human-readable description, for debugging.
    fn description(&self) -> String;
}

/// A cheap-clone handle to a [`ValueCalculation`].
///
/// Handles compare by identity: the add and the remove of one modifier must
/// share the same handle (the builder layer reuses it).
///
/// # Examples
///
/// ```rust
/// use modgraph::Value;
///
/// let base = Value::constant(100.0);
/// let scaled = base.times(Value::constant(3.0));
/// assert_eq!(scaled.description(), "(100 × 3)");
/// ```
#[derive(Clone)]
pub struct Value(Arc<dyn ValueCalculation>);

impl Value {
    /// Wrap a calculation.
    pub fn new(calculation: impl ValueCalculation + 'static) -> Self {
        Self(Arc::new(calculation))
    }

    /// A constant single value.
    pub fn constant(value: f64) -> Self {
        Self::new(Constant(Some(NodeValue::from(value))))
    }

    /// A constant ranged value.
    pub fn constant_range(minimum: f64, maximum: f64) -> Self {
        Self::new(Constant(Some(NodeValue::new(minimum, maximum))))
    }

    /// The null value (no contribution).
    pub fn none() -> Self {
        Self::new(Constant(None))
    }

    /// Another stat's Total on the main path.
    pub fn from_stat(stat: Stat) -> Self {
        Self::new(StatValue {
            stat,
            node_type: NodeType::Total,
            path: PathDefinition::main(),
        })
    }

    /// A specific node of another stat.
    pub fn from_node(stat: Stat, node_type: NodeType, path: PathDefinition) -> Self {
        Self::new(StatValue {
            stat,
            node_type,
            path,
        })
    }

    /// An ad-hoc calculation from a closure.
    pub fn from_fn<F>(description: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError>
            + Send
            + Sync
            + 'static,
    {
        Self::new(FnValue {
            description: description.into(),
            f,
        })
    }

    /// Branch on a boolean condition value.
    ///
    /// A null condition counts as false. A missing `otherwise` branch
    /// yields null.
    pub fn conditional(condition: Value, then: Value, otherwise: Option<Value>) -> Self {
        Self::new(Conditional {
            condition,
            then,
            otherwise,
        })
    }

    /// Map a transform over both bounds of this value.
    pub fn select(self, description: impl Into<String>, f: fn(f64) -> f64) -> Self {
        Self::new(Select {
            inner: self,
            f,
            description: description.into(),
        })
    }

    pub fn plus(self, other: Value) -> Self {
        Self::new(Binary {
            lhs: self,
            rhs: other,
            op: BinaryOp::Add,
        })
    }

    pub fn minus(self, other: Value) -> Self {
        Self::new(Binary {
            lhs: self,
            rhs: other,
            op: BinaryOp::Subtract,
        })
    }

    pub fn times(self, other: Value) -> Self {
        Self::new(Binary {
            lhs: self,
            rhs: other,
            op: BinaryOp::Multiply,
        })
    }

    pub fn divided_by(self, other: Value) -> Self {
        Self::new(Binary {
            lhs: self,
            rhs: other,
            op: BinaryOp::Divide,
        })
    }

    /// Evaluate against the graph.
    pub fn calculate(&self, ctx: &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError> {
        self.0.calculate(ctx)
    }

    pub fn description(&self) -> String {
        self.0.description()
    }

    /// Handle identity, used for modifier equality.
    pub fn same_calculation(&self, other: &Value) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Value({})", self.description())
    }
}

struct Constant(Option<NodeValue>);

impl ValueCalculation for Constant {
    fn calculate(&self, _ctx: &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError> {
        Ok(self.0)
    }

    fn description(&self) -> String {
        match self.0 {
            Some(v) => v.to_string(),
            None => "null".to_string(),
        }
    }
}

struct StatValue {
    stat: Stat,
    node_type: NodeType,
    path: PathDefinition,
}

impl ValueCalculation for StatValue {
    fn calculate(&self, ctx: &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError> {
        ctx.value(&self.stat, self.node_type, &self.path)
    }

    fn description(&self) -> String {
        format!("{}.{:?}", self.stat, self.node_type)
    }
}

struct FnValue<F> {
    description: String,
    f: F,
}

impl<F> ValueCalculation for FnValue<F>
where
    F: Fn(&mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError> + Send + Sync,
{
    fn calculate(&self, ctx: &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError> {
        (self.f)(ctx)
    }

    fn description(&self) -> String {
        self.description.clone()
    }
}

struct Conditional {
    condition: Value,
    then: Value,
    otherwise: Option<Value>,
}

impl ValueCalculation for Conditional {
    fn calculate(&self, ctx: &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError> {
        let holds = self
            .condition
            .calculate(ctx)?
            .map(|v| v.is_true())
            .unwrap_or(false);
        if holds {
            self.then.calculate(ctx)
        } else {
            match &self.otherwise {
                Some(value) => value.calculate(ctx),
                None => Ok(None),
            }
        }
    }

    fn description(&self) -> String {
        format!(
            "if {} then {} else {}",
            self.condition.description(),
            self.then.description(),
            self.otherwise
                .as_ref()
                .map_or_else(|| "null".to_string(), Value::description)
        )
    }
}

struct Select {
    inner: Value,
    f: fn(f64) -> f64,
    description: String,
}

impl ValueCalculation for Select {
    fn calculate(&self, ctx: &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError> {
        Ok(self.inner.calculate(ctx)?.map(|v| v.select(self.f)))
    }

    fn description(&self) -> String {
        format!("{}({})", self.description, self.inner.description())
    }
}

#[derive(Clone, Copy)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "×",
            BinaryOp::Divide => "/",
        }
    }
}

struct Binary {
    lhs: Value,
    rhs: Value,
    op: BinaryOp,
}

impl ValueCalculation for Binary {
    fn calculate(&self, ctx: &mut ValueContext<'_>) -> Result<Option<NodeValue>, CalcError> {
        let lhs = self.lhs.calculate(ctx)?;
        let rhs = self.rhs.calculate(ctx)?;
        // A null operand makes the whole expression null
        let (Some(lhs), Some(rhs)) = (lhs, rhs) else {
            return Ok(None);
        };
        Ok(Some(match self.op {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Subtract => lhs - rhs,
            BinaryOp::Multiply => lhs * rhs,
            BinaryOp::Divide => lhs / rhs,
        }))
    }

    fn description(&self) -> String {
        format!(
            "({} {} {})",
            self.lhs.description(),
            self.op.symbol(),
            self.rhs.description()
        )
    }
}
