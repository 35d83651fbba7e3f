//! Shared application state for all routes.

use crate::config::{ResolvedModel, ResolvedResource};
use crate::error::AppError;
use crate::store::Store;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub model: Arc<ResolvedModel>,
    /// Accepted bearer tokens and the user each acts as. Empty means any non-empty token is accepted.
    pub api_tokens: Arc<HashMap<String, Option<Uuid>>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, model: ResolvedModel, api_tokens: HashMap<String, Option<Uuid>>) -> Self {
        AppState {
            store,
            model: Arc::new(model),
            api_tokens: Arc::new(api_tokens),
        }
    }

    /// Resource served at `{module}/{resource}`.
    pub fn resource(&self, module: &str, resource: &str) -> Result<&ResolvedResource, AppError> {
        let path = format!("{}/{}", module, resource);
        self.model
            .resource_by_path(&path)
            .ok_or_else(|| AppError::NotFound(format!("resource {}", path)))
    }
}
