//! Admin server: settings from env (and `.env`), catalog resolved at startup, PostgreSQL or in-memory store.

use admin_backend::{
    app_router, apply_migrations, builtin_resources, ensure_database_exists, load_from_path, resolve, AppState,
    MemoryStore, PgStore, Settings, Store, StoreBackend,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "admin_backend=info";

/// `RUST_LOG` when set and valid, the default filter otherwise.
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(directives.as_deref()))
        .init();

    let settings = Settings::from_env()?;
    let resources = match &settings.resources_path {
        Some(path) => load_from_path(path).await?,
        None => builtin_resources()?,
    };
    let model = resolve(&resources, &settings.schema)?;
    tracing::info!(resources = model.resources.len(), schema = %settings.schema, "catalog resolved");

    let store: Arc<dyn Store> = match settings.store {
        StoreBackend::Postgres => {
            ensure_database_exists(&settings.database_url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .connect(&settings.database_url)
                .await?;
            apply_migrations(&pool, &model).await?;
            Arc::new(PgStore::new(pool))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };
    if settings.api_tokens.is_empty() {
        tracing::warn!("ADMIN_API_TOKENS is empty; any bearer token is accepted");
    }

    let state = AppState::new(store, model, settings.api_tokens.clone());
    let app = app_router(state);

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
