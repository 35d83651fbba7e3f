//! Load the resource catalog (built-in or from a JSON file) and resolve it into the runtime model.

use crate::config::resolved::{
    ColumnInfo, Dependent, Hierarchy, Reference, ResolvedModel, ResolvedResource, ValueKind, CREATED_COLUMN,
    FOUNDER_COLUMN, UPDATED_COLUMN,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

const BUILTIN_CATALOG: &str = include_str!("resources.json");

/// The seven administrative resources served by default.
pub fn builtin_resources() -> Result<Vec<ResourceConfig>, ConfigError> {
    serde_json::from_str(BUILTIN_CATALOG).map_err(|e| ConfigError::Load(format!("built-in catalog: {}", e)))
}

/// Read a JSON array of resource descriptions.
pub async fn load_from_path(path: &Path) -> Result<Vec<ResourceConfig>, ConfigError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Build resolved model from the catalog (validates first). Tables live in `schema_name`.
pub fn resolve(resources: &[ResourceConfig], schema_name: &str) -> Result<ResolvedModel, ConfigError> {
    validate(resources)?;

    let pks: HashMap<&str, &str> = resources.iter().map(|r| (r.id.as_str(), r.primary_key.as_str())).collect();
    let mut dependents: HashMap<&str, Vec<Dependent>> = HashMap::new();
    for r in resources {
        for reference in &r.references {
            dependents
                .entry(reference.resource.as_str())
                .or_default()
                .push(Dependent {
                    resource_id: r.id.clone(),
                    column: reference.column.clone(),
                    many: reference.many,
                });
        }
    }

    let mut out = Vec::with_capacity(resources.len());
    for r in resources {
        let mut columns: Vec<ColumnInfo> = r
            .columns
            .iter()
            .map(|c| {
                let pg_type = c.type_.base_name().to_lowercase();
                ColumnInfo {
                    name: c.name.clone(),
                    sql_type: c.type_.sql(),
                    kind: ValueKind::from_pg_type(&pg_type),
                    pg_type,
                    nullable: c.nullable,
                    default: c.default.clone(),
                }
            })
            .collect();
        for name in [CREATED_COLUMN, UPDATED_COLUMN] {
            if !columns.iter().any(|c| c.name == name) {
                columns.push(ColumnInfo {
                    name: name.to_string(),
                    sql_type: "timestamptz".into(),
                    pg_type: "timestamptz".into(),
                    kind: ValueKind::Timestamp,
                    nullable: false,
                    default: None,
                });
            }
        }

        let validation = implied_rules(r, &columns);

        out.push(ResolvedResource {
            id: r.id.clone(),
            path: r.path.clone(),
            schema_name: schema_name.to_string(),
            table_name: r.table.clone(),
            pk_column: r.primary_key.clone(),
            columns,
            hierarchy: r.hierarchy.as_ref().map(|h| Hierarchy {
                parent_column: h.parent_column.clone(),
                sort_column: h.sort_column.clone(),
            }),
            status_column: r.status_column.clone(),
            unique: r.unique.clone(),
            references: r
                .references
                .iter()
                .map(|x| Reference {
                    column: x.column.clone(),
                    resource_id: x.resource.clone(),
                    target_pk: pks.get(x.resource.as_str()).copied().unwrap_or_default().to_string(),
                    many: x.many,
                })
                .collect(),
            dependents: dependents.remove(r.id.as_str()).unwrap_or_default(),
            filters: r.filters.clone(),
            order_by: r.order_by.clone(),
            validation,
        });
    }
    Ok(ResolvedModel::new(out))
}

/// Merge explicit rules with the ones implied by the column definitions:
/// NOT NULL without default is required, varchar(n) caps the length, uuid columns need a UUID.
fn implied_rules(r: &ResourceConfig, columns: &[ColumnInfo]) -> HashMap<String, ValidationRule> {
    let mut rules = r.validation.clone();
    for c in columns {
        if c.name == r.primary_key || [CREATED_COLUMN, UPDATED_COLUMN, FOUNDER_COLUMN].contains(&c.name.as_str()) {
            continue;
        }
        let rule = rules.entry(c.name.clone()).or_default();
        if rule.required.is_none() && !c.nullable && c.default.is_none() {
            rule.required = Some(true);
        }
        if c.kind == ValueKind::Uuid && rule.format.is_none() {
            rule.format = Some("uuid".into());
        }
        if rule.max_length.is_none() && c.pg_type == "varchar" {
            let declared = r
                .columns
                .iter()
                .find(|x| x.name == c.name)
                .and_then(|x| x.type_.first_param());
            rule.max_length = declared;
        }
    }
    rules
}
