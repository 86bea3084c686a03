//! Query filters
//!
//! A small serializable filter tree over `(timestamp, value)` pairs. Time
//! comparisons apply to the point's timestamp, value comparisons to its
//! numeric view; non-numeric values never satisfy a value comparison.

use seriesio_common::TsValue;
use serde::{Deserialize, Serialize};

/// Comparison operator of a filter leaf
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Gt,
    GtEq,
    Lt,
    LtEq,
    Eq,
}

impl CompareOp {
    fn holds<T: PartialOrd>(self, left: T, right: T) -> bool {
        match self {
            Self::Gt => left > right,
            Self::GtEq => left >= right,
            Self::Lt => left < right,
            Self::LtEq => left <= right,
            Self::Eq => left == right,
        }
    }
}

/// A filter over series points
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    Time(CompareOp, i64),
    Value(CompareOp, f64),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    #[must_use]
    pub const fn time_gt_eq(t: i64) -> Self {
        Self::Time(CompareOp::GtEq, t)
    }

    #[must_use]
    pub const fn time_lt(t: i64) -> Self {
        Self::Time(CompareOp::Lt, t)
    }

    #[must_use]
    pub const fn value_lt_eq(v: f64) -> Self {
        Self::Value(CompareOp::LtEq, v)
    }

    #[must_use]
    pub const fn value_gt_eq(v: f64) -> Self {
        Self::Value(CompareOp::GtEq, v)
    }

    #[must_use]
    pub fn and(left: Self, right: Self) -> Self {
        Self::And(Box::new(left), Box::new(right))
    }

    #[must_use]
    pub fn or(left: Self, right: Self) -> Self {
        Self::Or(Box::new(left), Box::new(right))
    }

    /// Evaluate the filter against one point.
    #[must_use]
    pub fn satisfies(&self, timestamp: i64, value: &TsValue) -> bool {
        match self {
            Self::Time(op, t) => op.holds(timestamp, *t),
            Self::Value(op, v) => value.as_f64().is_some_and(|x| op.holds(x, *v)),
            Self::And(l, r) => l.satisfies(timestamp, value) && r.satisfies(timestamp, value),
            Self::Or(l, r) => l.satisfies(timestamp, value) || r.satisfies(timestamp, value),
        }
    }
}
