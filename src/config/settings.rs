//! Process settings from the environment (optionally seeded from `.env`).

use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub database_url: String,
    pub store: StoreBackend,
    /// PostgreSQL schema for resource tables. Must be a valid identifier.
    pub schema: String,
    pub bind_addr: String,
    /// Accepted bearer tokens, each optionally bound to the user recorded as `founder` of what it creates.
    /// Empty accepts any non-empty token.
    pub api_tokens: HashMap<String, Option<Uuid>>,
    pub resources_path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let store = match get("ADMIN_STORE").as_deref().map(str::trim) {
            None | Some("") | Some("postgres") => StoreBackend::Postgres,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Validation(format!(
                    "ADMIN_STORE must be 'postgres' or 'memory', got '{}'",
                    other
                )))
            }
        };
        let schema = get("ADMIN_SCHEMA").unwrap_or_else(|| "public".into());
        if schema.is_empty() || !schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::Validation(format!("ADMIN_SCHEMA is not a valid identifier: '{}'", schema)));
        }
        let max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::Validation(format!("DB_MAX_CONNECTIONS must be a number, got '{}'", v)))?,
            None => 5,
        };
        let mut api_tokens = HashMap::new();
        if let Some(v) = get("ADMIN_API_TOKENS") {
            // `token` or `token=<user uuid>`
            for entry in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (token, user) = match entry.split_once('=') {
                    Some((token, user)) => {
                        let user = Uuid::parse_str(user.trim()).map_err(|_| {
                            ConfigError::Validation(format!("ADMIN_API_TOKENS: '{}' is not a user UUID", user.trim()))
                        })?;
                        (token.trim(), Some(user))
                    }
                    None => (entry, None),
                };
                api_tokens.insert(token.to_string(), user);
            }
        }

        Ok(Settings {
            database_url: get("DATABASE_URL").unwrap_or_else(|| "postgres://localhost/xmw_admin".into()),
            store,
            schema,
            bind_addr: get("ADMIN_BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            api_tokens,
            resources_path: get("ADMIN_RESOURCES_PATH").filter(|s| !s.is_empty()).map(PathBuf::from),
            max_connections,
        })
    }
}
