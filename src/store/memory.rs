//! In-memory store with the same filtering and ordering semantics as the SQL builder.

use crate::config::{ResolvedResource, CREATED_COLUMN};
use crate::error::AppError;
use crate::store::{Condition, ConditionOp, DeleteGuard, ListQuery, Store};
use crate::tree::Row;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

type Tables = HashMap<String, Vec<Row>>;

/// Tables keyed by resource id; each table keeps rows in insertion order.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, AppError> {
        self.tables
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, AppError> {
        self.tables
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }
}

fn pk_matches(resource: &ResolvedResource, row: &Row, id: &str) -> bool {
    row.get(&resource.pk_column).and_then(Value::as_str) == Some(id)
}

fn as_instant(v: &Value) -> Option<DateTime<FixedOffset>> {
    v.as_str().and_then(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Ordering of two non-null values: instants, then numbers, then text.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (as_instant(a), as_instant(b)) {
        return Some(x.cmp(&y));
    }
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            x == y || matches!((as_instant(a), as_instant(b)), (Some(p), Some(q)) if p == q)
        }
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn row_matches(row: &Row, cond: &Condition) -> bool {
    let cell = row.get(&cond.column).unwrap_or(&Value::Null);
    match (cond.op, cond.value.is_null()) {
        (ConditionOp::Eq, true) => cell.is_null(),
        (ConditionOp::NotEq, true) => !cell.is_null(),
        _ if cell.is_null() => false,
        (ConditionOp::Eq, false) => values_equal(cell, &cond.value),
        (ConditionOp::NotEq, false) => !values_equal(cell, &cond.value),
        (ConditionOp::Contains, _) => match (text_of(cell), text_of(&cond.value)) {
            (Some(hay), Some(needle)) => hay.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        },
        (ConditionOp::Gte, _) => matches!(
            compare_values(cell, &cond.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        (ConditionOp::Lte, _) => matches!(
            compare_values(cell, &cond.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        (ConditionOp::Includes, _) => cell
            .as_array()
            .map(|items| items.iter().any(|e| values_equal(e, &cond.value)))
            .unwrap_or(false),
    }
}

/// Group members equal pairwise, null matching only null.
fn same_group(a: &Row, b: &Row, group: &[String]) -> bool {
    group.iter().all(|c| {
        let x = a.get(c).unwrap_or(&Value::Null);
        let y = b.get(c).unwrap_or(&Value::Null);
        match (x.is_null(), y.is_null()) {
            (true, true) => true,
            (false, false) => values_equal(x, y),
            _ => false,
        }
    })
}

/// The parent and every single-id reference of `row` must name a stored row, as a foreign key would.
/// With `changed`, only changed columns are checked.
fn check_links(tables: &Tables, resource: &ResolvedResource, row: &Row, changed: Option<&Row>) -> Result<(), AppError> {
    let mut links: Vec<(&str, &str, &str)> = Vec::new();
    if let Some(h) = &resource.hierarchy {
        links.push((h.parent_column.as_str(), resource.id.as_str(), resource.pk_column.as_str()));
    }
    for r in resource.references.iter().filter(|r| !r.many) {
        links.push((r.column.as_str(), r.resource_id.as_str(), r.target_pk.as_str()));
    }
    for (column, table, pk) in links {
        if changed.is_some_and(|c| !c.contains_key(column)) {
            continue;
        }
        let Some(id) = row.get(column).and_then(Value::as_str) else { continue };
        let found = tables
            .get(table)
            .is_some_and(|t| t.iter().any(|r| r.get(pk).and_then(Value::as_str) == Some(id)));
        if !found {
            return Err(AppError::Conflict(format!("{} {} does not exist", column, id)));
        }
    }
    Ok(())
}

/// `row` (primary key `id`) must not share a unique group with another row of `table`.
/// With `changed`, only groups containing a changed column are checked.
fn check_unique(
    resource: &ResolvedResource,
    table: &[Row],
    row: &Row,
    id: &str,
    changed: Option<&Row>,
) -> Result<(), AppError> {
    for group in &resource.unique {
        if let Some(changed) = changed {
            if !group.iter().any(|c| changed.contains_key(c)) {
                continue;
            }
        }
        if table
            .iter()
            .any(|other| !pk_matches(resource, other, id) && same_group(other, row, group))
        {
            return Err(AppError::Conflict(format!(
                "{} with the same {} already exists",
                resource.id,
                group.join(", ")
            )));
        }
    }
    Ok(())
}

/// PostgreSQL defaults: NULLS LAST ascending, NULLS FIRST descending.
fn compare_rows(resource: &ResolvedResource, a: &Row, b: &Row) -> Ordering {
    let mut keys: Vec<(&str, bool)> = resource
        .order_by
        .iter()
        .map(|o| (o.column.as_str(), o.descending))
        .collect();
    if !keys.iter().any(|(c, _)| *c == CREATED_COLUMN) {
        keys.push((CREATED_COLUMN, false));
    }
    for (column, descending) in keys {
        let x = a.get(column).unwrap_or(&Value::Null);
        let y = b.get(column).unwrap_or(&Value::Null);
        let ord = match (x.is_null(), y.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => compare_values(x, y).unwrap_or(Ordering::Equal),
        };
        let ord = if descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[async_trait]
impl Store for MemoryStore {
    async fn list(&self, resource: &ResolvedResource, query: &ListQuery) -> Result<Vec<Row>, AppError> {
        let tables = self.read()?;
        let mut rows: Vec<Row> = tables
            .get(&resource.id)
            .map(|t| {
                t.iter()
                    .filter(|r| query.conditions.iter().all(|c| row_matches(r, c)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);
        rows.sort_by(|a, b| compare_rows(resource, a, b));
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query
            .limit
            .map(|n| n.min(crate::sql::MAX_LIMIT) as usize)
            .unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count(&self, resource: &ResolvedResource, conditions: &[Condition]) -> Result<u64, AppError> {
        let tables = self.read()?;
        let n = tables
            .get(&resource.id)
            .map(|t| t.iter().filter(|r| conditions.iter().all(|c| row_matches(r, c))).count())
            .unwrap_or(0);
        Ok(n as u64)
    }

    async fn get(&self, resource: &ResolvedResource, id: Uuid) -> Result<Option<Row>, AppError> {
        let id = id.to_string();
        let tables = self.read()?;
        Ok(tables
            .get(&resource.id)
            .and_then(|t| t.iter().find(|r| pk_matches(resource, r, &id)))
            .cloned())
    }

    async fn insert(&self, resource: &ResolvedResource, row: &Row) -> Result<Row, AppError> {
        let id = row
            .get(&resource.pk_column)
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Internal(format!("insert without '{}'", resource.pk_column)))?
            .to_string();
        let stored: Row = resource
            .columns
            .iter()
            .map(|c| (c.name.clone(), row.get(&c.name).cloned().unwrap_or(Value::Null)))
            .collect();
        let mut tables = self.write()?;
        check_links(&tables, resource, &stored, None)?;
        let table = tables.entry(resource.id.clone()).or_default();
        if table.iter().any(|r| pk_matches(resource, r, &id)) {
            return Err(AppError::Conflict(format!("{} '{}' already exists", resource.pk_column, id)));
        }
        check_unique(resource, table, &stored, &id, None)?;
        table.push(stored.clone());
        Ok(stored)
    }

    async fn update(&self, resource: &ResolvedResource, id: Uuid, changes: &Row) -> Result<Option<Row>, AppError> {
        let id = id.to_string();
        let mut tables = self.write()?;
        let Some(existing) = tables
            .get(&resource.id)
            .and_then(|t| t.iter().find(|r| pk_matches(resource, r, &id)))
        else {
            return Ok(None);
        };
        let mut row = existing.clone();
        for (k, v) in changes {
            if *k != resource.pk_column && resource.column(k).is_some() {
                row.insert(k.clone(), v.clone());
            }
        }
        check_links(&tables, resource, &row, Some(changes))?;
        let Some(table) = tables.get_mut(&resource.id) else {
            return Ok(None);
        };
        let Some(pos) = table.iter().position(|r| pk_matches(resource, r, &id)) else {
            return Ok(None);
        };
        check_unique(resource, table, &row, &id, Some(changes))?;
        table[pos] = row.clone();
        Ok(Some(row))
    }

    async fn delete(&self, resource: &ResolvedResource, id: Uuid, guards: &[DeleteGuard<'_>]) -> Result<u64, AppError> {
        let id = id.to_string();
        let mut tables = self.write()?;
        for guard in guards {
            let blocked = tables
                .get(&guard.resource.id)
                .map(|t| t.iter().any(|r| guard.conditions.iter().all(|c| row_matches(r, c))))
                .unwrap_or(false);
            if blocked {
                return Err(AppError::Conflict(format!(
                    "{} {} is still referenced by {}",
                    resource.id, id, guard.resource.id
                )));
            }
        }
        let Some(table) = tables.get_mut(&resource.id) else {
            return Ok(0);
        };
        let before = table.len();
        table.retain(|r| !pk_matches(resource, r, &id));
        Ok((before - table.len()) as u64)
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.read().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_resources, resolve};
    use serde_json::json;

    fn role() -> ResolvedResource {
        resolve(&builtin_resources().unwrap(), "public")
            .unwrap()
            .resource("role")
            .unwrap()
            .clone()
    }

    fn role_row(name: &str, sort: i64, created: &str, describe: Value) -> Row {
        json!({
            "role_id": Uuid::new_v4().to_string(),
            "role_name": name,
            "role_code": name.to_uppercase(),
            "sort": sort,
            "status": 1,
            "describe": describe,
            "created_time": created,
            "updated_time": created,
        })
        .as_object()
        .unwrap()
        .clone()
    }

    async fn seeded() -> (MemoryStore, ResolvedResource) {
        let store = MemoryStore::new();
        let r = role();
        store.insert(&r, &role_row("editor", 2, "2024-03-01T00:00:00Z", json!("edits"))).await.unwrap();
        store.insert(&r, &role_row("admin", 1, "2024-01-01T00:00:00Z", Value::Null)).await.unwrap();
        store.insert(&r, &role_row("viewer", 2, "2024-02-01T00:00:00Z", json!("reads"))).await.unwrap();
        (store, r)
    }

    fn names(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r["role_name"].as_str().unwrap()).collect()
    }

    #[tokio::test]
    async fn orders_by_declared_keys_then_creation() {
        let (store, r) = seeded().await;
        let rows = store.list(&r, &ListQuery::default()).await.unwrap();
        assert_eq!(names(&rows), vec!["admin", "viewer", "editor"]);
    }

    #[tokio::test]
    async fn filters_contains_time_window_and_null() {
        let (store, r) = seeded().await;
        let q = ListQuery {
            conditions: vec![Condition::new("role_name", ConditionOp::Contains, json!("E"))],
            ..Default::default()
        };
        assert_eq!(names(&store.list(&r, &q).await.unwrap()), vec!["viewer", "editor"]);

        let q = ListQuery {
            conditions: vec![
                Condition::new("created_time", ConditionOp::Gte, json!("2024-01-15T00:00:00+00:00")),
                Condition::new("created_time", ConditionOp::Lte, json!("2024-02-01T00:00:00Z")),
            ],
            ..Default::default()
        };
        assert_eq!(names(&store.list(&r, &q).await.unwrap()), vec!["viewer"]);

        let nulls = store.count(&r, &[Condition::eq("describe", Value::Null)]).await.unwrap();
        assert_eq!(nulls, 1);
        let others = store.count(&r, &[Condition::not_eq("describe", json!("edits"))]).await.unwrap();
        assert_eq!(others, 1, "null cells never match <>");
    }

    #[tokio::test]
    async fn pages_with_limit_and_offset() {
        let (store, r) = seeded().await;
        let q = ListQuery {
            limit: Some(1),
            offset: Some(1),
            ..Default::default()
        };
        assert_eq!(names(&store.list(&r, &q).await.unwrap()), vec!["viewer"]);
    }

    #[tokio::test]
    async fn update_and_delete_by_id() {
        let (store, r) = seeded().await;
        let rows = store.list(&r, &ListQuery::default()).await.unwrap();
        let id = Uuid::parse_str(rows[0]["role_id"].as_str().unwrap()).unwrap();

        let mut changes = Row::new();
        changes.insert("status".into(), json!(0));
        changes.insert("bogus".into(), json!(true));
        let updated = store.update(&r, id, &changes).await.unwrap().unwrap();
        assert_eq!(updated["status"], 0);
        assert!(updated.get("bogus").is_none());

        assert_eq!(store.delete(&r, id, &[]).await.unwrap(), 1);
        assert_eq!(store.delete(&r, id, &[]).await.unwrap(), 0);
        assert!(store.get(&r, id).await.unwrap().is_none());
        assert!(store.update(&r, id, &changes).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_primary_key_conflicts() {
        let store = MemoryStore::new();
        let r = role();
        let row = role_row("admin", 1, "2024-01-01T00:00:00Z", Value::Null);
        store.insert(&r, &row).await.unwrap();
        assert!(matches!(store.insert(&r, &row).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn unique_groups_hold_under_the_write_lock() {
        let store = MemoryStore::new();
        let r = role();
        store.insert(&r, &role_row("admin", 1, "2024-01-01T00:00:00Z", Value::Null)).await.unwrap();

        let mut clash = role_row("other", 1, "2024-01-02T00:00:00Z", Value::Null);
        clash.insert("role_code".into(), json!("ADMIN"));
        assert!(matches!(store.insert(&r, &clash).await, Err(AppError::Conflict(_))));
        assert_eq!(store.count(&r, &[]).await.unwrap(), 1);

        let editor = role_row("editor", 2, "2024-01-03T00:00:00Z", Value::Null);
        store.insert(&r, &editor).await.unwrap();
        let editor_id = Uuid::parse_str(editor["role_id"].as_str().unwrap()).unwrap();
        let mut rename = Row::new();
        rename.insert("role_name".into(), json!("admin"));
        assert!(matches!(store.update(&r, editor_id, &rename).await, Err(AppError::Conflict(_))));
        let kept = store.get(&r, editor_id).await.unwrap().unwrap();
        assert_eq!(kept["role_name"], "editor");

        // rewriting its own values is not a collision
        let mut same = Row::new();
        same.insert("role_code".into(), json!("EDITOR"));
        assert!(store.update(&r, editor_id, &same).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn null_group_members_collide_with_nulls() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let org = model.resource("organization").unwrap();
        let org_row = |code: &str| {
            json!({
                "org_id": Uuid::new_v4().to_string(),
                "org_name": "HQ",
                "org_code": code,
                "org_type": "company",
                "parent_id": null,
                "created_time": "2024-01-01T00:00:00Z",
                "updated_time": "2024-01-01T00:00:00Z",
            })
            .as_object()
            .unwrap()
            .clone()
        };
        let store = MemoryStore::new();
        store.insert(org, &org_row("hq")).await.unwrap();
        assert!(matches!(store.insert(org, &org_row("hq2")).await, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn parent_and_references_must_exist() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let jobs = model.resource("jobs").unwrap();
        let row = json!({
            "jobs_id": Uuid::new_v4().to_string(),
            "jobs_name": "Engineer",
            "org_id": Uuid::new_v4().to_string(),
            "created_time": "2024-01-01T00:00:00Z",
            "updated_time": "2024-01-01T00:00:00Z",
        });
        let store = MemoryStore::new();
        assert!(matches!(
            store.insert(jobs, row.as_object().unwrap()).await,
            Err(AppError::Conflict(_))
        ));
        assert_eq!(store.count(jobs, &[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn guarded_delete_keeps_referenced_rows() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let menu = model.resource("menu").unwrap();
        let role = model.resource("role").unwrap();
        let store = MemoryStore::new();
        let menu_id = Uuid::new_v4();
        let menu_row = json!({
            "menu_id": menu_id.to_string(),
            "name": "dashboard",
            "menu_type": "menu",
            "created_time": "2024-01-01T00:00:00Z",
            "updated_time": "2024-01-01T00:00:00Z",
        });
        store.insert(menu, menu_row.as_object().unwrap()).await.unwrap();
        let mut granted = role_row("admin", 1, "2024-01-01T00:00:00Z", Value::Null);
        granted.insert("menu_permission".into(), json!([menu_id.to_string()]));
        store.insert(role, &granted).await.unwrap();

        let guards = [DeleteGuard {
            resource: role,
            conditions: vec![Condition::includes("menu_permission", json!(menu_id.to_string()))],
        }];
        assert!(matches!(store.delete(menu, menu_id, &guards).await, Err(AppError::Conflict(_))));
        assert!(store.get(menu, menu_id).await.unwrap().is_some());

        let mut revoke = Row::new();
        revoke.insert("menu_permission".into(), json!([]));
        let role_id = Uuid::parse_str(granted["role_id"].as_str().unwrap()).unwrap();
        store.update(role, role_id, &revoke).await.unwrap();
        assert_eq!(store.delete(menu, menu_id, &guards).await.unwrap(), 1);
    }
}
