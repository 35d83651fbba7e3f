//! Admin backend: catalog-driven CRUD for back-office resources (organizations, jobs, announcements,
//! roles, menus, translations, users) with tree listings for hierarchical resources.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod migration;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;
pub mod tree;

pub use config::{builtin_resources, load_from_path, resolve, ResolvedModel, ResolvedResource, Settings, StoreBackend};
pub use error::{AppError, ConfigError};
pub use migration::apply_migrations;
pub use response::{success, success_msg, Envelope, PageResult};
pub use routes::{app_router, common_routes, resource_routes};
pub use service::CrudService;
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryStore, PgStore, Store};
