//! Raw resource descriptions matching the catalog JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnTypeConfig {
    Simple(String),
    Parameterized { name: String, params: Option<Vec<u32>> },
}

impl ColumnTypeConfig {
    pub fn base_name(&self) -> &str {
        match self {
            ColumnTypeConfig::Simple(s) => s.as_str(),
            ColumnTypeConfig::Parameterized { name, .. } => name.as_str(),
        }
    }

    /// SQL spelling, e.g. `varchar(32)`.
    pub fn sql(&self) -> String {
        match self {
            ColumnTypeConfig::Simple(s) => s.clone(),
            ColumnTypeConfig::Parameterized { name, params } => {
                let p = params
                    .as_ref()
                    .map(|v| v.iter().map(|n| n.to_string()).collect::<Vec<_>>().join(", "))
                    .unwrap_or_default();
                if p.is_empty() {
                    name.clone()
                } else {
                    format!("{}({})", name, p)
                }
            }
        }
    }

    pub fn first_param(&self) -> Option<u32> {
        match self {
            ColumnTypeConfig::Simple(_) => None,
            ColumnTypeConfig::Parameterized { params, .. } => params.as_ref().and_then(|p| p.first().copied()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: ColumnTypeConfig,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Literal default, applied by the service on create and rendered into DDL.
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_parent_column() -> String {
    "parent_id".into()
}

/// Self-referencing adjacency list: rows point at their parent through `parent_column`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HierarchyConfig {
    #[serde(default = "default_parent_column")]
    pub parent_column: String,
    #[serde(default)]
    pub sort_column: Option<String>,
}

/// Column holding the id of a row of another resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceConfig {
    pub column: String,
    pub resource: String,
    /// `column` is a json/jsonb array of ids.
    #[serde(default)]
    pub many: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    #[default]
    Eq,
    /// Case-insensitive substring match.
    Contains,
    Gte,
    Lte,
}

/// Query parameter `param` filters column `column` with `op`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    pub param: String,
    pub column: String,
    #[serde(default)]
    pub op: FilterOp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderConfig {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Stable name used by references, e.g. `organization`.
    pub id: String,
    /// Route path below `/api`, e.g. `administrative/organization`.
    pub path: String,
    pub table: String,
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub hierarchy: Option<HierarchyConfig>,
    /// Enabled/disabled flag updated by PATCH.
    #[serde(default)]
    pub status_column: Option<String>,
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    #[serde(default)]
    pub references: Vec<ReferenceConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub order_by: Vec<OrderConfig>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
    #[serde(default)]
    pub comment: Option<String>,
}
