//! Ranged numeric values.
//!
//! Provides the `NodeValue` type, the result of every calculation node:
//! an immutable `(minimum, maximum)` pair of `f64`. A "single" value has
//! `minimum == maximum`. `Option<NodeValue>` distinguishes "no contribution"
//! (`None`) from "contributes zero" (`Some(0)`).

use serde::{Deserialize, Serialize};
use std::ops::{Add, Div, Mul, Neg, Sub};

/// A ranged numeric value with a minimum and a maximum bound.
///
/// The constructor normalizes its arguments, so `minimum <= maximum` holds
/// for every `NodeValue` ever observed.
///
/// # Examples
///
/// ```rust
/// use modgraph::NodeValue;
///
/// let single = NodeValue::from(5.0);
/// assert_eq!(single.minimum(), 5.0);
/// assert_eq!(single.maximum(), 5.0);
///
/// // Arguments are reordered if necessary
/// let range = NodeValue::new(8.0, 3.0);
/// assert_eq!(range.minimum(), 3.0);
/// assert_eq!(range.maximum(), 8.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeValue {
    minimum: f64,
    maximum: f64,
}

impl NodeValue {
    /// Create a ranged value. The smaller argument becomes the minimum.
    pub fn new(minimum: f64, maximum: f64) -> Self {
        Self {
            minimum: minimum.min(maximum),
            maximum: minimum.max(maximum),
        }
    }

    /// The zero value.
    pub const ZERO: NodeValue = NodeValue {
        minimum: 0.0,
        maximum: 0.0,
    };

    /// The one value.
    pub const ONE: NodeValue = NodeValue {
        minimum: 1.0,
        maximum: 1.0,
    };

    /// The lower bound.
    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// The upper bound.
    pub fn maximum(&self) -> f64 {
        self.maximum
    }

    /// The single value, if this is not a proper range.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modgraph::NodeValue;
    ///
    /// assert_eq!(NodeValue::from(4.0).single(), Some(4.0));
    /// assert_eq!(NodeValue::new(1.0, 2.0).single(), None);
    /// ```
    pub fn single(&self) -> Option<f64> {
        (self.minimum == self.maximum).then_some(self.minimum)
    }

    /// Nonzero-as-boolean semantics for boolean stats.
    pub fn is_true(&self) -> bool {
        self.minimum != 0.0 || self.maximum != 0.0
    }

    /// Map a transform over both bounds (used for rounding).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use modgraph::NodeValue;
    ///
    /// let v = NodeValue::new(1.4, 2.6).select(f64::round);
    /// assert_eq!(v, NodeValue::new(1.0, 3.0));
    /// ```
    pub fn select(self, f: impl Fn(f64) -> f64) -> Self {
        Self::new(f(self.minimum), f(self.maximum))
    }

    /// Clip this value against optional lower and upper bound values.
    ///
    /// Each bound applies component-wise: the minimum is clamped between
    /// `lower.minimum` and `upper.minimum`, the maximum between
    /// `lower.maximum` and `upper.maximum`. A missing bound leaves that
    /// side open.
    pub fn clip(self, lower: Option<NodeValue>, upper: Option<NodeValue>) -> Self {
        let mut minimum = self.minimum;
        let mut maximum = self.maximum;
        if let Some(lo) = lower {
            minimum = minimum.max(lo.minimum);
            maximum = maximum.max(lo.maximum);
        }
        if let Some(hi) = upper {
            minimum = minimum.min(hi.minimum);
            maximum = maximum.min(hi.maximum);
        }
        Self::new(minimum, maximum)
    }
}

impl From<f64> for NodeValue {
    fn from(value: f64) -> Self {
        Self {
            minimum: value,
            maximum: value,
        }
    }
}

impl From<bool> for NodeValue {
    fn from(value: bool) -> Self {
        Self::from(if value { 1.0 } else { 0.0 })
    }
}

impl Add for NodeValue {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self::new(self.minimum + other.minimum, self.maximum + other.maximum)
    }
}

impl Sub for NodeValue {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Self::new(self.minimum - other.minimum, self.maximum - other.maximum)
    }
}

impl Mul for NodeValue {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Self::new(self.minimum * other.minimum, self.maximum * other.maximum)
    }
}

impl Div for NodeValue {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Self::new(self.minimum / other.minimum, self.maximum / other.maximum)
    }
}

impl Neg for NodeValue {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.maximum, -self.minimum)
    }
}

impl std::fmt::Display for NodeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.single() {
            Some(v) => write!(f, "{}", v),
            None => write!(f, "{} to {}", self.minimum, self.maximum),
        }
    }
}

/// Sum an iterator of optional values, skipping `None`.
///
/// Returns `None` if every element is `None` (or the iterator is empty).
pub(crate) fn sum_where_some<I>(values: I) -> Option<NodeValue>
where
    I: IntoIterator<Item = Option<NodeValue>>,
{
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.map_or(v, |a: NodeValue| a + v)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_orders_bounds() {
        let v = NodeValue::new(10.0, 2.0);
        assert_eq!(v.minimum(), 2.0);
        assert_eq!(v.maximum(), 10.0);
    }

    #[test]
    fn test_single() {
        assert_eq!(NodeValue::from(3.5).single(), Some(3.5));
        assert_eq!(NodeValue::new(1.0, 2.0).single(), None);
    }

    #[test]
    fn test_arithmetic_combines_bounds_independently() {
        let a = NodeValue::new(1.0, 2.0);
        let b = NodeValue::new(10.0, 20.0);

        assert_eq!(a + b, NodeValue::new(11.0, 22.0));
        assert_eq!(b - a, NodeValue::new(9.0, 18.0));
        assert_eq!(a * b, NodeValue::new(10.0, 40.0));
        assert_eq!(b / a, NodeValue::new(10.0, 10.0));
    }

    #[test]
    fn test_is_true() {
        assert!(NodeValue::from(1.0).is_true());
        assert!(NodeValue::from(-0.5).is_true());
        assert!(!NodeValue::ZERO.is_true());
        assert!(NodeValue::from(true).is_true());
        assert!(!NodeValue::from(false).is_true());
    }

    #[test]
    fn test_select() {
        let v = NodeValue::new(1.2, 3.7).select(f64::ceil);
        assert_eq!(v, NodeValue::new(2.0, 4.0));
    }

    #[test]
    fn test_clip() {
        let lower = Some(NodeValue::from(10.0));
        let upper = Some(NodeValue::from(20.0));

        assert_eq!(NodeValue::from(5.0).clip(lower, upper), NodeValue::from(10.0));
        assert_eq!(NodeValue::from(15.0).clip(lower, upper), NodeValue::from(15.0));
        assert_eq!(NodeValue::from(25.0).clip(lower, upper), NodeValue::from(20.0));
        assert_eq!(NodeValue::from(25.0).clip(lower, None), NodeValue::from(25.0));
    }

    #[test]
    fn test_sum_where_some() {
        assert_eq!(sum_where_some([None, None]), None);
        assert_eq!(
            sum_where_some([Some(NodeValue::from(1.0)), None, Some(NodeValue::from(2.0))]),
            Some(NodeValue::from(3.0))
        );
    }
}
