//! Generic CRUD over any catalog resource, independent of the store backend.

use crate::config::{Reference, ResolvedModel, ResolvedResource, ValueKind, CREATED_COLUMN, FOUNDER_COLUMN, UPDATED_COLUMN};
use crate::error::AppError;
use crate::response::PageResult;
use crate::service::{parse_time, RequestValidator};
use crate::sql::MAX_LIMIT;
use crate::store::{Condition, ConditionOp, DeleteGuard, ListQuery, Store};
use crate::tree::{self, Row, TreeSpec};
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub struct CrudService;

impl CrudService {
    /// List matching rows. Flat resources are paged by `current`/`pageSize`; hierarchical ones come back
    /// as one tree over every matching row, with `total` counting those rows.
    pub async fn list(
        store: &dyn Store,
        resource: &ResolvedResource,
        params: &HashMap<String, String>,
    ) -> Result<PageResult<Value>, AppError> {
        let conditions = filter_conditions(resource, params)?;
        if let Some(h) = &resource.hierarchy {
            let query = ListQuery {
                conditions,
                ..ListQuery::default()
            };
            let rows = store.list(resource, &query).await?;
            let total = rows.len() as u64;
            let spec = TreeSpec {
                id_column: &resource.pk_column,
                parent_column: &h.parent_column,
                sort_column: h.sort_column.as_deref(),
            };
            let list = tree::assemble(rows, &spec)?;
            return Ok(PageResult { list, total });
        }

        let (limit, offset) = page_window(params)?;
        let total = store.count(resource, &conditions).await?;
        let query = ListQuery {
            conditions,
            limit,
            offset,
        };
        let list = store
            .list(resource, &query)
            .await?
            .into_iter()
            .map(Value::Object)
            .collect();
        Ok(PageResult { list, total })
    }

    pub async fn read(store: &dyn Store, resource: &ResolvedResource, id: Uuid) -> Result<Row, AppError> {
        store
            .get(resource, id)
            .await?
            .ok_or_else(|| not_found(resource, id))
    }

    /// Insert one row built from the payload's catalog columns plus column defaults.
    /// The primary key and audit columns are always assigned here.
    pub async fn create(
        store: &dyn Store,
        model: &ResolvedModel,
        resource: &ResolvedResource,
        payload: &Row,
    ) -> Result<Row, AppError> {
        Self::create_as(store, model, resource, payload, None).await
    }

    /// `create` with the calling user recorded in the resource's founder column, if it has one.
    pub async fn create_as(
        store: &dyn Store,
        model: &ResolvedModel,
        resource: &ResolvedResource,
        payload: &Row,
        founder: Option<Uuid>,
    ) -> Result<Row, AppError> {
        let mut row = Row::new();
        for c in &resource.columns {
            if resource.is_managed(&c.name) {
                continue;
            }
            if let Some(v) = payload.get(&c.name) {
                row.insert(c.name.clone(), v.clone());
            } else if let Some(d) = &c.default {
                row.insert(c.name.clone(), d.clone());
            }
        }
        RequestValidator::validate(&row, resource)?;
        normalize_uuids(&mut row, resource);

        if let Some(h) = &resource.hierarchy {
            if let Some(parent) = uuid_value(row.get(&h.parent_column)) {
                if store.get(resource, parent).await?.is_none() {
                    return Err(AppError::Conflict(format!(
                        "{} {} does not exist",
                        h.parent_column, parent
                    )));
                }
            }
        }
        check_references(store, model, resource, &row).await?;
        check_unique(store, resource, &row, None, None).await?;

        let id = Uuid::new_v4();
        let now = timestamp();
        row.insert(resource.pk_column.clone(), Value::String(id.to_string()));
        row.insert(CREATED_COLUMN.into(), Value::String(now.clone()));
        row.insert(UPDATED_COLUMN.into(), Value::String(now));
        if let (Some(user), Some(_)) = (founder, resource.column(FOUNDER_COLUMN)) {
            row.insert(FOUNDER_COLUMN.into(), Value::String(user.to_string()));
        }

        let stored = store.insert(resource, &row).await?;
        tracing::info!(resource = %resource.id, id = %id, "created");
        Ok(stored)
    }

    /// Overwrite the provided catalog columns of an existing row.
    pub async fn update(
        store: &dyn Store,
        model: &ResolvedModel,
        resource: &ResolvedResource,
        id: Uuid,
        payload: &Row,
    ) -> Result<Row, AppError> {
        let existing = store
            .get(resource, id)
            .await?
            .ok_or_else(|| not_found(resource, id))?;

        let mut changes: Row = payload
            .iter()
            .filter(|(k, _)| resource.column(k).is_some() && !resource.is_managed(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        RequestValidator::validate_partial(&changes, resource)?;
        normalize_uuids(&mut changes, resource);

        if let Some(h) = &resource.hierarchy {
            if let Some(parent) = uuid_value(changes.get(&h.parent_column)) {
                check_new_parent(store, resource, id, parent).await?;
            }
        }
        check_references(store, model, resource, &changes).await?;

        let mut merged = existing;
        for (k, v) in &changes {
            merged.insert(k.clone(), v.clone());
        }
        let touched: HashSet<&str> = changes.keys().map(String::as_str).collect();
        check_unique(store, resource, &merged, Some(id), Some(&touched)).await?;

        changes.insert(UPDATED_COLUMN.into(), Value::String(timestamp()));
        let stored = store
            .update(resource, id, &changes)
            .await?
            .ok_or_else(|| not_found(resource, id))?;
        tracing::info!(resource = %resource.id, id = %id, "updated");
        Ok(stored)
    }

    /// Enable (1) or disable (0) a row through the resource's status column.
    pub async fn update_status(
        store: &dyn Store,
        model: &ResolvedModel,
        resource: &ResolvedResource,
        id: Uuid,
        body: &Row,
    ) -> Result<Row, AppError> {
        let Some(status_column) = &resource.status_column else {
            return Err(AppError::BadRequest(format!(
                "{} has no status column",
                resource.path
            )));
        };
        let status = match body.get("status") {
            None | Some(Value::Null) => {
                return Err(AppError::Validation("status is required".into()));
            }
            Some(v) => match v.as_i64() {
                Some(n @ (0 | 1)) => n,
                _ => return Err(AppError::Validation("status must be 0 or 1".into())),
            },
        };
        let mut changes = Row::new();
        changes.insert(status_column.clone(), Value::from(status));
        Self::update(store, model, resource, id, &changes).await
    }

    /// Remove one row. Rows that still have children or are referenced by another resource are kept
    /// and reported as a conflict. Returns the number of rows removed.
    pub async fn delete(
        store: &dyn Store,
        model: &ResolvedModel,
        resource: &ResolvedResource,
        id: Uuid,
    ) -> Result<u64, AppError> {
        if store.get(resource, id).await?.is_none() {
            return Err(not_found(resource, id));
        }
        let id_value = Value::String(id.to_string());

        let mut guards = Vec::new();
        if let Some(h) = &resource.hierarchy {
            let children = vec![Condition::eq(h.parent_column.as_str(), id_value.clone())];
            let n = store.count(resource, &children).await?;
            if n > 0 {
                tracing::warn!(resource = %resource.id, id = %id, children = n, "delete rejected: row has children");
                return Err(AppError::Conflict(format!(
                    "{} {} has {} child row(s)",
                    resource.id, id, n
                )));
            }
            guards.push(DeleteGuard {
                resource,
                conditions: children,
            });
        }
        for dep in &resource.dependents {
            let other = model
                .resource(&dep.resource_id)
                .ok_or_else(|| AppError::Internal(format!("unknown resource {}", dep.resource_id)))?;
            let referencing = if dep.many {
                Condition::includes(dep.column.as_str(), id_value.clone())
            } else {
                Condition::eq(dep.column.as_str(), id_value.clone())
            };
            let n = store.count(other, std::slice::from_ref(&referencing)).await?;
            if n > 0 {
                tracing::warn!(resource = %resource.id, id = %id, dependent = %other.id, rows = n, "delete rejected: row is referenced");
                return Err(AppError::Conflict(format!(
                    "{} {} is referenced by {} {} row(s)",
                    resource.id, id, n, other.id
                )));
            }
            guards.push(DeleteGuard {
                resource: other,
                conditions: vec![referencing],
            });
        }

        let removed = store.delete(resource, id, &guards).await?;
        tracing::info!(resource = %resource.id, id = %id, removed, "deleted");
        Ok(removed)
    }
}

fn not_found(resource: &ResolvedResource, id: Uuid) -> AppError {
    AppError::NotFound(format!("{} {}", resource.id, id))
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Validated UUID columns are rewritten in canonical lowercase hyphenated form, and so are the elements
/// of id arrays (which also lose duplicates).
fn normalize_uuids(row: &mut Row, resource: &ResolvedResource) {
    for (k, v) in row.iter_mut() {
        if resource.column(k).map(|c| c.kind) == Some(ValueKind::Uuid) {
            if let Some(u) = uuid_value(Some(v)) {
                *v = Value::String(u.to_string());
            }
        } else if resource.references.iter().any(|r| r.many && r.column == *k) {
            if let Value::Array(items) = v {
                let mut seen = HashSet::new();
                let mut ids = Vec::with_capacity(items.len());
                for item in items.iter() {
                    match uuid_value(Some(item)) {
                        Some(u) if seen.insert(u) => ids.push(Value::String(u.to_string())),
                        Some(_) => {}
                        None => ids.push(item.clone()),
                    }
                }
                *items = ids;
            }
        }
    }
}

fn uuid_value(v: Option<&Value>) -> Option<Uuid> {
    v.and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}

/// The new parent must exist and must not be the row itself or one of its descendants.
async fn check_new_parent(
    store: &dyn Store,
    resource: &ResolvedResource,
    id: Uuid,
    parent: Uuid,
) -> Result<(), AppError> {
    let Some(h) = &resource.hierarchy else { return Ok(()) };
    let mut seen = HashSet::new();
    let mut current = parent;
    loop {
        if current == id {
            return Err(AppError::Conflict(format!(
                "moving {} {} under {} would create a cycle",
                resource.id, id, parent
            )));
        }
        if !seen.insert(current) {
            return Err(AppError::Integrity(format!(
                "parent cycle already stored above {} {}",
                resource.id, parent
            )));
        }
        let Some(row) = store.get(resource, current).await? else {
            return Err(AppError::Conflict(format!(
                "{} {} does not exist",
                h.parent_column, current
            )));
        };
        match uuid_value(row.get(&h.parent_column)) {
            Some(next) => current = next,
            None => return Ok(()),
        }
    }
}

async fn check_references(
    store: &dyn Store,
    model: &ResolvedModel,
    resource: &ResolvedResource,
    row: &Row,
) -> Result<(), AppError> {
    for reference in &resource.references {
        let Some(value) = row.get(&reference.column) else { continue };
        let targets = if reference.many {
            referenced_ids(resource, reference, value)?
        } else {
            uuid_value(Some(value)).into_iter().collect()
        };
        if targets.is_empty() {
            continue;
        }
        let target = model
            .resource(&reference.resource_id)
            .ok_or_else(|| AppError::Internal(format!("unknown resource {}", reference.resource_id)))?;
        for target_id in targets {
            if store.get(target, target_id).await?.is_none() {
                return Err(AppError::Conflict(format!(
                    "{} {} does not exist",
                    reference.column, target_id
                )));
            }
        }
    }
    Ok(())
}

/// Ids held by an id-array column. Anything but an array of UUID strings is rejected.
fn referenced_ids(resource: &ResolvedResource, reference: &Reference, value: &Value) -> Result<Vec<Uuid>, AppError> {
    let invalid = || AppError::Validation(format!("{} must be an array of UUIDs", reference.column));
    match value {
        Value::Null if resource.column(&reference.column).is_some_and(|c| c.nullable) => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| uuid_value(Some(item)).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// Each unique group must not match another row. A null member matches only nulls, so root siblings
/// share one namespace. With `touched`, groups without a changed column are skipped.
async fn check_unique(
    store: &dyn Store,
    resource: &ResolvedResource,
    row: &Row,
    exclude: Option<Uuid>,
    touched: Option<&HashSet<&str>>,
) -> Result<(), AppError> {
    for group in &resource.unique {
        if let Some(touched) = touched {
            if !group.iter().any(|c| touched.contains(c.as_str())) {
                continue;
            }
        }
        let mut conditions: Vec<Condition> = group
            .iter()
            .map(|c| Condition::eq(c.as_str(), row.get(c).cloned().unwrap_or(Value::Null)))
            .collect();
        if let Some(id) = exclude {
            conditions.push(Condition::not_eq(
                resource.pk_column.as_str(),
                Value::String(id.to_string()),
            ));
        }
        if store.count(resource, &conditions).await? > 0 {
            let described: Vec<String> = group
                .iter()
                .map(|c| format!("{}={}", c, row.get(c).unwrap_or(&Value::Null)))
                .collect();
            return Err(AppError::Conflict(format!(
                "{} with {} already exists",
                resource.id,
                described.join(", ")
            )));
        }
    }
    Ok(())
}

/// Page window from `current`/`page` (1-based) and `pageSize`/`page_size`. A missing or zero page size
/// disables paging.
fn page_window(params: &HashMap<String, String>) -> Result<(Option<u64>, Option<u64>), AppError> {
    let size = match lookup(params, &["pageSize", "page_size"]) {
        None => return Ok((None, None)),
        Some(s) => parse_count("pageSize", s)?,
    };
    if size == 0 {
        return Ok((None, None));
    }
    let size = size.min(MAX_LIMIT);
    let current = match lookup(params, &["current", "page"]) {
        None => 1,
        Some(s) => parse_count("current", s)?.max(1),
    };
    Ok((Some(size), Some((current - 1).saturating_mul(size))))
}

fn lookup<'a>(params: &'a HashMap<String, String>, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|n| params.get(*n))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn parse_count(name: &str, s: &str) -> Result<u64, AppError> {
    s.parse::<u64>()
        .map_err(|_| AppError::Validation(format!("{} must be a non-negative integer", name)))
}

/// Turn the resource's declared filters into conditions. Empty values are treated as absent.
fn filter_conditions(
    resource: &ResolvedResource,
    params: &HashMap<String, String>,
) -> Result<Vec<Condition>, AppError> {
    let mut out = Vec::new();
    for filter in &resource.filters {
        let Some(raw) = lookup(params, &[filter.param.as_str()]) else { continue };
        let Some(column) = resource.column(&filter.column) else { continue };
        let op = ConditionOp::from(filter.op);
        let value = if op == ConditionOp::Contains {
            Value::String(raw.to_string())
        } else {
            filter_value(&filter.param, raw, column.kind, op)?
        };
        out.push(Condition::new(filter.column.as_str(), op, value));
    }
    Ok(out)
}

fn filter_value(param: &str, raw: &str, kind: ValueKind, op: ConditionOp) -> Result<Value, AppError> {
    let invalid = |what: &str| AppError::Validation(format!("{} must be {}", param, what));
    Ok(match kind {
        ValueKind::Integer => Value::from(raw.parse::<i64>().map_err(|_| invalid("an integer"))?),
        ValueKind::Number => {
            let n = raw.parse::<f64>().map_err(|_| invalid("a number"))?;
            serde_json::Number::from_f64(n)
                .map(Value::Number)
                .ok_or_else(|| invalid("a finite number"))?
        }
        ValueKind::Boolean => match raw {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => return Err(invalid("a boolean")),
        },
        ValueKind::Uuid => Value::String(
            Uuid::parse_str(raw)
                .map_err(|_| invalid("a UUID"))?
                .to_string(),
        ),
        ValueKind::Timestamp => {
            let mut t = parse_time(raw).ok_or_else(|| invalid("a date or timestamp"))?;
            // a bare date as upper bound covers the whole day
            if op == ConditionOp::Lte && raw.len() == 10 {
                t += chrono::Duration::days(1) - chrono::Duration::microseconds(1);
            }
            Value::String(t.to_rfc3339_opts(SecondsFormat::Micros, true))
        }
        ValueKind::Text | ValueKind::Json => Value::String(raw.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_resources, resolve};

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn page_window_defaults_to_everything() {
        assert_eq!(page_window(&params(&[])).unwrap(), (None, None));
        assert_eq!(page_window(&params(&[("pageSize", "0"), ("current", "3")])).unwrap(), (None, None));
        assert_eq!(page_window(&params(&[("current", "2")])).unwrap(), (None, None));
    }

    #[test]
    fn page_window_aliases_and_cap() {
        assert_eq!(page_window(&params(&[("pageSize", "10"), ("current", "3")])).unwrap(), (Some(10), Some(20)));
        assert_eq!(page_window(&params(&[("page_size", "10"), ("page", "1")])).unwrap(), (Some(10), Some(0)));
        assert_eq!(page_window(&params(&[("pageSize", "5000")])).unwrap(), (Some(1000), Some(0)));
        assert_eq!(page_window(&params(&[("pageSize", "10"), ("current", "0")])).unwrap(), (Some(10), Some(0)));
        assert!(matches!(page_window(&params(&[("pageSize", "-1")])), Err(AppError::Validation(_))));
    }

    #[test]
    fn filters_typed_by_column() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let org = model.resource("organization").unwrap();
        let conds = filter_conditions(
            org,
            &params(&[
                ("org_name", "dev"),
                ("status", "1"),
                ("start_time", "2024-03-01"),
                ("end_time", "2024-03-31"),
                ("org_code", ""),
                ("unrelated", "x"),
            ]),
        )
        .unwrap();
        assert_eq!(conds.len(), 4);
        assert_eq!(conds[0], Condition::new("org_name", ConditionOp::Contains, Value::from("dev")));
        assert_eq!(conds[1], Condition::eq("status", Value::from(1)));
        assert_eq!(
            conds[2],
            Condition::new("created_time", ConditionOp::Gte, Value::from("2024-03-01T00:00:00.000000Z"))
        );
        assert_eq!(
            conds[3],
            Condition::new("created_time", ConditionOp::Lte, Value::from("2024-03-31T23:59:59.999999Z"))
        );
    }

    #[test]
    fn malformed_filter_values_are_rejected() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let org = model.resource("organization").unwrap();
        assert!(matches!(
            filter_conditions(org, &params(&[("status", "on")])),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            filter_conditions(org, &params(&[("start_time", "yesterday")])),
            Err(AppError::Validation(_))
        ));
        let user = model.resource("user").unwrap();
        assert!(matches!(
            filter_conditions(user, &params(&[("org_id", "42")])),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn time_filter_accepts_datetime_with_space() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let role = model.resource("role").unwrap();
        let conds = filter_conditions(role, &params(&[("end_time", "2024-03-31 12:30:00")])).unwrap();
        assert_eq!(conds[0].value, Value::from("2024-03-31T12:30:00.000000Z"));
    }
}
