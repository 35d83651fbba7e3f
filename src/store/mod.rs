//! Row storage behind one trait: PostgreSQL for deployments, in-memory for development and tests.

mod memory;
mod postgres;
mod query;

pub use memory::MemoryStore;
pub use postgres::{ensure_database_exists, PgStore};
pub use query::{Condition, ConditionOp, DeleteGuard, ListQuery};

use crate::config::ResolvedResource;
use crate::error::AppError;
use crate::tree::Row;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait Store: Send + Sync {
    /// Rows matching all conditions, in the resource's declared order, paged by limit/offset.
    async fn list(&self, resource: &ResolvedResource, query: &ListQuery) -> Result<Vec<Row>, AppError>;

    async fn count(&self, resource: &ResolvedResource, conditions: &[Condition]) -> Result<u64, AppError>;

    async fn get(&self, resource: &ResolvedResource, id: Uuid) -> Result<Option<Row>, AppError>;

    /// Persist a complete row (primary key and audit columns included). Returns the stored row.
    /// A row colliding with another on a unique group is a Conflict.
    async fn insert(&self, resource: &ResolvedResource, row: &Row) -> Result<Row, AppError>;

    /// Overwrite the given columns. Returns the updated row, or None when the id is unknown.
    /// Unique groups are enforced as on insert.
    async fn update(&self, resource: &ResolvedResource, id: Uuid, changes: &Row) -> Result<Option<Row>, AppError>;

    /// Returns the number of rows removed (0 or 1). A matching guard keeps the row and is a Conflict.
    async fn delete(&self, resource: &ResolvedResource, id: Uuid, guards: &[DeleteGuard<'_>]) -> Result<u64, AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}
