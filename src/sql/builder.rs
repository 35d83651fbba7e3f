//! Builds parameterized SELECT, COUNT, INSERT, UPDATE, DELETE from a resolved resource.

use crate::config::{ColumnInfo, ResolvedResource, CREATED_COLUMN};
use crate::sql::PgBindValue;
use crate::store::{Condition, ConditionOp, DeleteGuard, ListQuery};
use crate::tree::Row;
use serde_json::Value;

/// Upper bound on LIMIT regardless of what the caller asks for.
pub const MAX_LIMIT: u64 = 1000;

/// Quote identifier for PostgreSQL (safe: only from catalog).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(resource: &ResolvedResource) -> String {
    format!("{}.{}", quoted(&resource.schema_name), quoted(&resource.table_name))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<PgBindValue>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Push a parameter and return its placeholder with the column's cast, e.g. `$2::uuid`.
    fn placeholder(&mut self, v: &Value, column: Option<&ColumnInfo>) -> String {
        self.params.push(PgBindValue::for_column(v, column));
        let n = self.params.len();
        match column {
            Some(c) => format!("${}::{}", n, c.pg_type),
            None => format!("${}", n),
        }
    }
}

/// SELECT list: numeric goes out as text so the row decoder sees a string instead of an unsupported type.
fn select_column_list(resource: &ResolvedResource) -> String {
    resource
        .columns
        .iter()
        .map(|c| {
            let q = quoted(&c.name);
            if c.pg_type == "numeric" {
                format!("{}::text AS {}", q, q)
            } else {
                q
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// LIKE pattern matching `needle` literally anywhere.
fn contains_pattern(needle: &Value) -> Value {
    let raw = match needle {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let escaped = raw.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    Value::String(format!("%{}%", escaped))
}

fn predicates(resource: &ResolvedResource, q: &mut QueryBuf, conditions: &[Condition]) -> Vec<String> {
    let mut parts = Vec::new();
    for cond in conditions {
        let Some(column) = resource.column(&cond.column) else {
            continue;
        };
        let col = quoted(&column.name);
        let part = match (cond.op, cond.value.is_null()) {
            (ConditionOp::Eq, true) => format!("{} IS NULL", col),
            (ConditionOp::NotEq, true) => format!("{} IS NOT NULL", col),
            (ConditionOp::Eq, false) => format!("{} = {}", col, q.placeholder(&cond.value, Some(column))),
            (ConditionOp::NotEq, false) => format!("{} <> {}", col, q.placeholder(&cond.value, Some(column))),
            (ConditionOp::Contains, _) => {
                let pattern = contains_pattern(&cond.value);
                format!("{}::text ILIKE {}", col, q.placeholder(&pattern, None))
            }
            (ConditionOp::Gte, _) => format!("{} >= {}", col, q.placeholder(&cond.value, Some(column))),
            (ConditionOp::Lte, _) => format!("{} <= {}", col, q.placeholder(&cond.value, Some(column))),
            (ConditionOp::Includes, _) => {
                let element = Value::Array(vec![cond.value.clone()]);
                format!("{} @> {}", col, q.placeholder(&element, Some(column)))
            }
        };
        parts.push(part);
    }
    parts
}

fn where_clause(resource: &ResolvedResource, q: &mut QueryBuf, conditions: &[Condition]) -> String {
    let parts = predicates(resource, q, conditions);
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

/// Declared order, then creation time, then primary key so ties are deterministic.
fn order_clause(resource: &ResolvedResource) -> String {
    let mut keys: Vec<String> = resource
        .order_by
        .iter()
        .map(|o| {
            if o.descending {
                format!("{} DESC", quoted(&o.column))
            } else {
                quoted(&o.column)
            }
        })
        .collect();
    if !resource.order_by.iter().any(|o| o.column == CREATED_COLUMN) {
        keys.push(quoted(CREATED_COLUMN));
    }
    keys.push(quoted(&resource.pk_column));
    format!(" ORDER BY {}", keys.join(", "))
}

/// SELECT list with conditions, declared ORDER BY, optional LIMIT/OFFSET.
pub fn select_list(resource: &ResolvedResource, query: &ListQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(resource, &mut q, &query.conditions);
    let limit_clause = query
        .limit
        .map(|n| format!(" LIMIT {}", n.min(MAX_LIMIT)))
        .unwrap_or_default();
    let offset_clause = query.offset.map(|n| format!(" OFFSET {}", n)).unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}{}",
        select_column_list(resource),
        qualified_table(resource),
        where_sql,
        order_clause(resource),
        limit_clause,
        offset_clause
    );
    q
}

pub fn count(resource: &ResolvedResource, conditions: &[Condition]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(resource, &mut q, conditions);
    q.sql = format!("SELECT COUNT(*) FROM {}{}", qualified_table(resource), where_sql);
    q
}

/// SELECT by primary key. Caller binds the id as `$1`.
pub fn select_by_id(resource: &ResolvedResource) -> String {
    format!(
        "SELECT {} FROM {} WHERE {} = $1",
        select_column_list(resource),
        qualified_table(resource),
        quoted(&resource.pk_column)
    )
}

/// INSERT every catalog column present in `row`, RETURNING the stored row.
pub fn insert(resource: &ResolvedResource, row: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    for c in &resource.columns {
        let Some(v) = row.get(&c.name) else { continue };
        cols.push(quoted(&c.name));
        placeholders.push(q.placeholder(v, Some(c)));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        qualified_table(resource),
        cols.join(", "),
        placeholders.join(", "),
        select_column_list(resource)
    );
    q
}

/// UPDATE by id: SET only catalog columns present in `changes`; the primary key is never set.
/// With nothing to set this degrades to a SELECT by id.
pub fn update(resource: &ResolvedResource, id: &Value, changes: &Row) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = resource.column(&resource.pk_column);
    let mut sets = Vec::new();
    for c in &resource.columns {
        if c.name == resource.pk_column {
            continue;
        }
        let Some(v) = changes.get(&c.name) else { continue };
        sets.push(format!("{} = {}", quoted(&c.name), q.placeholder(v, Some(c))));
    }
    if sets.is_empty() {
        let id_ph = q.placeholder(id, pk);
        q.sql = format!(
            "SELECT {} FROM {} WHERE {} = {}",
            select_column_list(resource),
            qualified_table(resource),
            quoted(&resource.pk_column),
            id_ph
        );
        return q;
    }
    let id_ph = q.placeholder(id, pk);
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(resource),
        sets.join(", "),
        quoted(&resource.pk_column),
        id_ph,
        select_column_list(resource)
    );
    q
}

/// DELETE by id, skipped while any guard matches a row (`NOT EXISTS` per guard).
pub fn delete(resource: &ResolvedResource, id: &Value, guards: &[DeleteGuard<'_>]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let id_ph = q.placeholder(id, resource.column(&resource.pk_column));
    let mut sql = format!(
        "DELETE FROM {} WHERE {} = {}",
        qualified_table(resource),
        quoted(&resource.pk_column),
        id_ph
    );
    for guard in guards {
        let parts = predicates(guard.resource, &mut q, &guard.conditions);
        let filter = if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        };
        sql.push_str(&format!(
            " AND NOT EXISTS (SELECT 1 FROM {}{})",
            qualified_table(guard.resource),
            filter
        ));
    }
    q.sql = sql;
    q
}
