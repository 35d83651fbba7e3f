//! Apply the resolved catalog to the database: schema, one table per resource, unique constraints, indexes,
//! foreign keys.

use crate::config::{ColumnInfo, ResolvedModel, ResolvedResource};
use crate::error::AppError;
use crate::sql::{qualified_table, quoted};
use serde_json::Value;
use sqlx::PgPool;

/// Idempotent: every statement is `IF NOT EXISTS`, existing tables are left as they are.
pub async fn apply_migrations(pool: &PgPool, model: &ResolvedModel) -> Result<(), AppError> {
    let mut schemas: Vec<&str> = model.resources.iter().map(|r| r.schema_name.as_str()).collect();
    schemas.dedup();
    for schema in schemas {
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(schema)))
            .execute(pool)
            .await?;
    }

    for resource in &model.resources {
        let ddl = create_table_sql(resource)?;
        tracing::debug!(sql = %ddl, "migration");
        sqlx::query(&ddl).execute(pool).await?;
        for sql in index_sql(resource) {
            tracing::debug!(sql = %sql, "migration");
            sqlx::query(&sql).execute(pool).await?;
        }
        tracing::info!(table = %resource.table_name, "table ready");
    }
    // every table exists by now, so references may point anywhere
    for resource in &model.resources {
        for sql in foreign_key_sql(model, resource) {
            tracing::debug!(sql = %sql, "migration");
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    Ok(())
}

fn literal(v: &Value) -> Result<String, AppError> {
    Ok(match v {
        Value::Null => "NULL".into(),
        Value::Bool(b) => b.to_string().to_uppercase(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Array(_) | Value::Object(_) => format!("'{}'::jsonb", v.to_string().replace('\'', "''")),
    })
}

fn column_def(c: &ColumnInfo) -> Result<String, AppError> {
    let mut def = format!("{} {}", quoted(&c.name), c.sql_type);
    if !c.nullable {
        def.push_str(" NOT NULL");
    }
    if let Some(d) = &c.default {
        def.push_str(" DEFAULT ");
        def.push_str(&literal(d)?);
    }
    Ok(def)
}

pub fn create_table_sql(resource: &ResolvedResource) -> Result<String, AppError> {
    let mut defs = Vec::with_capacity(resource.columns.len() + 1 + resource.unique.len());
    for c in &resource.columns {
        defs.push(column_def(c)?);
    }
    defs.push(format!("PRIMARY KEY ({})", quoted(&resource.pk_column)));
    // groups over nullable columns become NULLS NOT DISTINCT indexes in index_sql
    for group in &resource.unique {
        if all_not_null(resource, group) {
            let cols: Vec<String> = group.iter().map(|s| quoted(s)).collect();
            defs.push(format!("UNIQUE ({})", cols.join(", ")));
        }
    }
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        qualified_table(resource),
        defs.join(",\n  ")
    ))
}

fn all_not_null(resource: &ResolvedResource, group: &[String]) -> bool {
    group
        .iter()
        .all(|col| resource.column(col).map(|c| !c.nullable).unwrap_or(false))
}

/// Parent and reference indexes, plus unique indexes for groups with nullable members where a null
/// matches another null (PostgreSQL 15+).
fn index_sql(resource: &ResolvedResource) -> Vec<String> {
    let mut out = Vec::new();
    for group in resource.unique.iter().filter(|g| !all_not_null(resource, g)) {
        let cols: Vec<String> = group.iter().map(|s| quoted(s)).collect();
        out.push(format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({}) NULLS NOT DISTINCT",
            quoted(&format!("{}_{}_key", resource.table_name, group.join("_"))),
            qualified_table(resource),
            cols.join(", ")
        ));
    }
    if let Some(h) = &resource.hierarchy {
        out.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
            quoted(&format!("{}_{}_idx", resource.table_name, h.parent_column)),
            qualified_table(resource),
            quoted(&h.parent_column)
        ));
    }
    for reference in &resource.references {
        out.push(format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}{} ({})",
            quoted(&format!("{}_{}_idx", resource.table_name, reference.column)),
            qualified_table(resource),
            if reference.many { " USING GIN" } else { "" },
            quoted(&reference.column)
        ));
    }
    out
}

/// `ON DELETE RESTRICT` keys for the parent column and every single-id reference. PostgreSQL has no
/// `ADD CONSTRAINT IF NOT EXISTS`, so each one is guarded by a catalog lookup.
fn foreign_key_sql(model: &ResolvedModel, resource: &ResolvedResource) -> Vec<String> {
    let mut keys: Vec<(&str, &ResolvedResource)> = Vec::new();
    if let Some(h) = &resource.hierarchy {
        keys.push((h.parent_column.as_str(), resource));
    }
    for reference in resource.references.iter().filter(|r| !r.many) {
        if let Some(target) = model.resource(&reference.resource_id) {
            keys.push((reference.column.as_str(), target));
        }
    }
    keys.into_iter()
        .map(|(column, target)| {
            let name = format!("{}_{}_fkey", resource.table_name, column);
            format!(
                "DO $$ BEGIN\n\
                 IF NOT EXISTS (SELECT 1 FROM pg_constraint WHERE conname = {} AND conrelid = {}::regclass) THEN\n\
                 ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE RESTRICT;\n\
                 END IF;\n\
                 END $$",
                sql_string(&name),
                sql_string(&qualified_table(resource)),
                qualified_table(resource),
                quoted(&name),
                quoted(column),
                qualified_table(target),
                quoted(&target.pk_column)
            )
        })
        .collect()
}

fn sql_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{builtin_resources, resolve};

    #[test]
    fn organization_table_ddl() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let org = model.resource("organization").unwrap();
        let ddl = create_table_sql(org).unwrap();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"public\".\"xmw_organization\" ("));
        assert!(ddl.contains("\"org_id\" uuid NOT NULL"));
        assert!(ddl.contains("\"org_name\" varchar(32) NOT NULL"));
        assert!(ddl.contains("\"status\" int NOT NULL DEFAULT 1"));
        assert!(ddl.contains("\"created_time\" timestamptz NOT NULL"));
        assert!(ddl.contains("PRIMARY KEY (\"org_id\")"));
        assert!(ddl.contains("UNIQUE (\"org_code\")"));
        assert!(!ddl.contains("UNIQUE (\"parent_id\", \"org_name\")"));

        let idx = index_sql(org);
        assert_eq!(
            idx[0],
            "CREATE UNIQUE INDEX IF NOT EXISTS \"xmw_organization_parent_id_org_name_key\" \
             ON \"public\".\"xmw_organization\" (\"parent_id\", \"org_name\") NULLS NOT DISTINCT"
        );
    }

    #[test]
    fn parent_and_reference_indexes() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let jobs = model.resource("jobs").unwrap();
        let idx = index_sql(jobs);
        assert_eq!(idx.len(), 3);
        assert!(idx[0].contains("\"xmw_jobs_parent_id_idx\""));

        let role = model.resource("role").unwrap();
        let idx = index_sql(role);
        assert_eq!(idx.len(), 1);
        assert!(idx[0].ends_with("ON \"public\".\"xmw_role\" USING GIN (\"menu_permission\")"));
    }

    #[test]
    fn foreign_keys_for_parent_and_single_references() {
        let model = resolve(&builtin_resources().unwrap(), "public").unwrap();
        let jobs = model.resource("jobs").unwrap();
        let fks = foreign_key_sql(&model, jobs);
        assert_eq!(fks.len(), 3);
        assert!(fks[0].contains("conname = 'xmw_jobs_parent_id_fkey'"));
        assert!(fks[0].contains(
            "FOREIGN KEY (\"parent_id\") REFERENCES \"public\".\"xmw_jobs\" (\"jobs_id\") ON DELETE RESTRICT"
        ));
        assert!(fks[1].contains("REFERENCES \"public\".\"xmw_organization\" (\"org_id\")"));

        // id arrays cannot carry a foreign key
        let role = model.resource("role").unwrap();
        assert!(foreign_key_sql(&model, role).is_empty());
    }

    #[test]
    fn literals_are_escaped() {
        assert_eq!(literal(&Value::String("it's".into())).unwrap(), "'it''s'");
        assert_eq!(literal(&Value::Bool(true)).unwrap(), "TRUE");
    }
}
