//! Backend-neutral query description shared by the SQL builder and the in-memory store.

use crate::config::{FilterOp, ResolvedResource};
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionOp {
    /// `= value`, or `IS NULL` when the value is null.
    Eq,
    /// `<> value`, or `IS NOT NULL` when the value is null. Null columns never match a non-null value.
    NotEq,
    /// Case-insensitive substring.
    Contains,
    Gte,
    Lte,
    /// The column is a JSON array with an element equal to the value.
    Includes,
}

impl From<FilterOp> for ConditionOp {
    fn from(op: FilterOp) -> Self {
        match op {
            FilterOp::Eq => ConditionOp::Eq,
            FilterOp::Contains => ConditionOp::Contains,
            FilterOp::Gte => ConditionOp::Gte,
            FilterOp::Lte => ConditionOp::Lte,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: ConditionOp,
    pub value: Value,
}

impl Condition {
    pub fn new(column: impl Into<String>, op: ConditionOp, value: Value) -> Self {
        Condition {
            column: column.into(),
            op,
            value,
        }
    }

    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, ConditionOp::Eq, value)
    }

    pub fn not_eq(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, ConditionOp::NotEq, value)
    }

    pub fn includes(column: impl Into<String>, value: Value) -> Self {
        Self::new(column, ConditionOp::Includes, value)
    }
}

/// A delete only proceeds while no row of `resource` matches all `conditions`.
#[derive(Clone, Debug)]
pub struct DeleteGuard<'a> {
    pub resource: &'a ResolvedResource,
    pub conditions: Vec<Condition>,
}

/// Conditions are ANDed; rows come back in the resource's declared order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListQuery {
    pub conditions: Vec<Condition>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}
