//! Resolved resource model: catalog validated and flattened for runtime use.

use crate::config::{FilterConfig, OrderConfig, ValidationRule};
use std::collections::HashMap;

/// Audit column stamped on create.
pub const CREATED_COLUMN: &str = "created_time";
/// Audit column stamped on create and every update.
pub const UPDATED_COLUMN: &str = "updated_time";
/// Creator of the row, stamped on create from the caller's identity when one is known.
pub const FOUNDER_COLUMN: &str = "founder";

/// JSON shape a column accepts, derived from its PostgreSQL type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueKind {
    Uuid,
    Integer,
    Number,
    Boolean,
    Text,
    Timestamp,
    Json,
}

impl ValueKind {
    pub fn from_pg_type(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "uuid" => ValueKind::Uuid,
            "smallint" | "int2" | "int" | "int4" | "integer" | "bigint" | "int8" => ValueKind::Integer,
            "real" | "float4" | "double precision" | "float8" | "numeric" => ValueKind::Number,
            "bool" | "boolean" => ValueKind::Boolean,
            "timestamptz" | "timestamp" | "date" => ValueKind::Timestamp,
            "json" | "jsonb" => ValueKind::Json,
            _ => ValueKind::Text,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    /// Full SQL type, e.g. `varchar(32)`.
    pub sql_type: String,
    /// Type used for parameter casts, e.g. `varchar`.
    pub pg_type: String,
    pub kind: ValueKind,
    pub nullable: bool,
    pub default: Option<serde_json::Value>,
}

#[derive(Clone, Debug)]
pub struct Hierarchy {
    pub parent_column: String,
    pub sort_column: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Reference {
    pub column: String,
    pub resource_id: String,
    /// Primary key column of the referenced resource.
    pub target_pk: String,
    /// The column holds a JSON array of ids instead of a single id.
    pub many: bool,
}

/// A resource whose `column` points at rows of the owning resource.
#[derive(Clone, Debug)]
pub struct Dependent {
    pub resource_id: String,
    pub column: String,
    pub many: bool,
}

#[derive(Clone, Debug)]
pub struct ResolvedResource {
    pub id: String,
    pub path: String,
    pub schema_name: String,
    pub table_name: String,
    pub pk_column: String,
    pub columns: Vec<ColumnInfo>,
    pub hierarchy: Option<Hierarchy>,
    pub status_column: Option<String>,
    pub unique: Vec<Vec<String>>,
    pub references: Vec<Reference>,
    pub dependents: Vec<Dependent>,
    pub filters: Vec<FilterConfig>,
    pub order_by: Vec<OrderConfig>,
    /// Per-column rules: explicit catalog rules merged with the ones implied by column types.
    pub validation: HashMap<String, ValidationRule>,
}

impl ResolvedResource {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Primary key and audit columns are owned by the service, never by the client.
    pub fn is_managed(&self, name: &str) -> bool {
        name == self.pk_column || name == CREATED_COLUMN || name == UPDATED_COLUMN || name == FOUNDER_COLUMN
    }

    pub fn is_hierarchical(&self) -> bool {
        self.hierarchy.is_some()
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedModel {
    pub resources: Vec<ResolvedResource>,
    by_path: HashMap<String, usize>,
    by_id: HashMap<String, usize>,
}

impl ResolvedModel {
    pub fn new(resources: Vec<ResolvedResource>) -> Self {
        let by_path = resources.iter().enumerate().map(|(i, r)| (r.path.clone(), i)).collect();
        let by_id = resources.iter().enumerate().map(|(i, r)| (r.id.clone(), i)).collect();
        ResolvedModel {
            resources,
            by_path,
            by_id,
        }
    }

    pub fn resource_by_path(&self, path: &str) -> Option<&ResolvedResource> {
        self.by_path.get(path).map(|&i| &self.resources[i])
    }

    pub fn resource(&self, id: &str) -> Option<&ResolvedResource> {
        self.by_id.get(id).map(|&i| &self.resources[i])
    }
}
