//! Tree assembly: flat rows linked through a parent column become nested `children` arrays.
//!
//! Rows are indexed by id once; each row is attached under its parent, rows without a parent
//! (null, absent, or pointing outside the row set) become roots. Siblings are ordered by the
//! sort column ascending, ties keep input order. Rows unreachable from any root sit on a parent
//! cycle and make the whole assembly fail instead of looping.

use crate::error::AppError;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

pub type Row = Map<String, Value>;

pub const CHILDREN_KEY: &str = "children";

#[derive(Clone, Copy, Debug)]
pub struct TreeSpec<'a> {
    pub id_column: &'a str,
    pub parent_column: &'a str,
    pub sort_column: Option<&'a str>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("row {index} has no id in column '{column}'")]
    MissingId { index: usize, column: String },
    #[error("duplicate id '{0}'")]
    DuplicateId(String),
    #[error("parent cycle among ids {0:?}")]
    Cycle(Vec<String>),
}

impl From<TreeError> for AppError {
    fn from(e: TreeError) -> Self {
        AppError::Integrity(e.to_string())
    }
}

fn key_of(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn cmp_sort(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn assemble(rows: Vec<Row>, spec: &TreeSpec<'_>) -> Result<Vec<Value>, TreeError> {
    let n = rows.len();
    let mut index: HashMap<String, usize> = HashMap::with_capacity(n);
    let mut keys = Vec::with_capacity(n);
    for (i, row) in rows.iter().enumerate() {
        let key = row
            .get(spec.id_column)
            .and_then(key_of)
            .ok_or_else(|| TreeError::MissingId {
                index: i,
                column: spec.id_column.to_string(),
            })?;
        if index.insert(key.clone(), i).is_some() {
            return Err(TreeError::DuplicateId(key));
        }
        keys.push(key);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut roots = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        let parent = row
            .get(spec.parent_column)
            .and_then(key_of)
            .and_then(|p| index.get(&p).copied());
        match parent {
            Some(p) => children[p].push(i),
            None => roots.push(i),
        }
    }

    let sort_keys: Vec<Option<f64>> = rows
        .iter()
        .map(|r| spec.sort_column.and_then(|c| r.get(c)).and_then(Value::as_f64))
        .collect();
    let by_sort = |a: &usize, b: &usize| cmp_sort(sort_keys[*a], sort_keys[*b]);
    roots.sort_by(by_sort);
    for siblings in children.iter_mut() {
        siblings.sort_by(by_sort);
    }

    // Breadth-first from the roots; every node has one parent so each is reached at most once.
    let mut order = roots.clone();
    let mut head = 0;
    while head < order.len() {
        let i = order[head];
        head += 1;
        order.extend_from_slice(&children[i]);
    }
    if order.len() < n {
        let mut seen = vec![false; n];
        for &i in &order {
            seen[i] = true;
        }
        let stuck: Vec<String> = (0..n).filter(|&i| !seen[i]).map(|i| keys[i].clone()).collect();
        tracing::warn!(ids = ?stuck, "parent cycle detected during tree assembly");
        return Err(TreeError::Cycle(stuck));
    }

    // Children come after their parent in `order`, so walking it backwards builds leaves first.
    let mut slots: Vec<Option<Row>> = rows.into_iter().map(Some).collect();
    let mut built: Vec<Option<Value>> = vec![None; n];
    for &i in order.iter().rev() {
        let mut row = slots[i].take().unwrap_or_default();
        let kids: Vec<Value> = children[i].iter().filter_map(|&c| built[c].take()).collect();
        row.insert(CHILDREN_KEY.to_string(), Value::Array(kids));
        built[i] = Some(Value::Object(row));
    }
    Ok(roots.iter().filter_map(|&r| built[r].take()).collect())
}
