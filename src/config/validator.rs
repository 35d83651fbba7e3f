//! Catalog validation: referential integrity and route consistency.

use crate::config::resolved::{ValueKind, CREATED_COLUMN, UPDATED_COLUMN};
use crate::config::ResourceConfig;
use crate::error::ConfigError;
use std::collections::HashSet;

fn check_column(
    resource: &ResourceConfig,
    columns: &HashSet<&str>,
    column: &str,
) -> Result<(), ConfigError> {
    if columns.contains(column) || column == CREATED_COLUMN || column == UPDATED_COLUMN {
        Ok(())
    } else {
        Err(ConfigError::UnknownColumn {
            resource: resource.id.clone(),
            column: column.to_string(),
        })
    }
}

fn column_kind(resource: &ResourceConfig, column: &str) -> Option<ValueKind> {
    resource
        .columns
        .iter()
        .find(|c| c.name == column)
        .map(|c| ValueKind::from_pg_type(c.type_.base_name()))
}

pub fn validate(resources: &[ResourceConfig]) -> Result<(), ConfigError> {
    if resources.is_empty() {
        return Err(ConfigError::Validation("at least one resource required".into()));
    }
    let ids: HashSet<&str> = resources.iter().map(|r| r.id.as_str()).collect();
    if ids.len() != resources.len() {
        return Err(ConfigError::Validation("resource ids must be unique".into()));
    }

    let mut paths = HashSet::new();
    for r in resources {
        let segments: Vec<&str> = r.path.split('/').collect();
        if segments.len() != 2 || segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "resource '{}': path must be 'module/resource', got '{}'",
                r.id, r.path
            )));
        }
        if !paths.insert(r.path.as_str()) {
            return Err(ConfigError::DuplicatePath(r.path.clone()));
        }

        let mut columns = HashSet::new();
        for c in &r.columns {
            if !columns.insert(c.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "resource '{}': duplicate column '{}'",
                    r.id, c.name
                )));
            }
        }

        check_column(r, &columns, &r.primary_key)?;
        if column_kind(r, &r.primary_key) != Some(ValueKind::Uuid) {
            return Err(ConfigError::Validation(format!(
                "resource '{}': primary key '{}' must be uuid",
                r.id, r.primary_key
            )));
        }

        if let Some(h) = &r.hierarchy {
            check_column(r, &columns, &h.parent_column)?;
            if column_kind(r, &h.parent_column) != Some(ValueKind::Uuid) {
                return Err(ConfigError::Validation(format!(
                    "resource '{}': parent column '{}' must be uuid",
                    r.id, h.parent_column
                )));
            }
            if let Some(sort) = &h.sort_column {
                check_column(r, &columns, sort)?;
            }
        }
        if let Some(status) = &r.status_column {
            check_column(r, &columns, status)?;
        }
        for group in &r.unique {
            if group.is_empty() {
                return Err(ConfigError::Validation(format!("resource '{}': empty unique group", r.id)));
            }
            for col in group {
                check_column(r, &columns, col)?;
            }
        }
        for f in &r.filters {
            check_column(r, &columns, &f.column)?;
        }
        for o in &r.order_by {
            check_column(r, &columns, &o.column)?;
        }
        for col in r.validation.keys() {
            check_column(r, &columns, col)?;
        }
        for reference in &r.references {
            check_column(r, &columns, &reference.column)?;
            if !ids.contains(reference.resource.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "resource",
                    id: reference.resource.clone(),
                });
            }
            let expected = if reference.many { ValueKind::Json } else { ValueKind::Uuid };
            if column_kind(r, &reference.column) != Some(expected) {
                return Err(ConfigError::Validation(format!(
                    "resource '{}': reference column '{}' must be {}",
                    r.id,
                    reference.column,
                    if reference.many { "json or jsonb" } else { "uuid" }
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_resources, ReferenceConfig};

    #[test]
    fn builtin_catalog_is_valid() {
        let resources = builtin_resources().unwrap();
        validate(&resources).unwrap();
    }

    #[test]
    fn duplicate_path_rejected() {
        let mut resources = builtin_resources().unwrap();
        let mut copy = resources[0].clone();
        copy.id = "copy".into();
        resources.push(copy);
        assert!(matches!(validate(&resources), Err(ConfigError::DuplicatePath(_))));
    }

    #[test]
    fn unknown_reference_target_rejected() {
        let mut resources = builtin_resources().unwrap();
        let column = resources[0].primary_key.clone();
        resources[0].references.push(ReferenceConfig {
            column,
            resource: "nowhere".into(),
            many: false,
        });
        assert!(matches!(
            validate(&resources),
            Err(ConfigError::MissingReference { kind: "resource", .. })
        ));
    }

    #[test]
    fn array_reference_needs_a_json_column() {
        let mut resources = builtin_resources().unwrap();
        let role = resources.iter_mut().find(|r| r.id == "role").unwrap();
        role.references.push(ReferenceConfig {
            column: "role_name".into(),
            resource: "menu".into(),
            many: true,
        });
        assert!(matches!(validate(&resources), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn unknown_filter_column_rejected() {
        let mut resources = builtin_resources().unwrap();
        resources[0].filters[0].column = "missing".into();
        assert!(matches!(validate(&resources), Err(ConfigError::UnknownColumn { .. })));
    }

    #[test]
    fn path_needs_module_and_resource() {
        let mut resources = builtin_resources().unwrap();
        resources[0].path = "organization".into();
        assert!(matches!(validate(&resources), Err(ConfigError::Validation(_))));
    }
}
