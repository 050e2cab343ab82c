//! Centralized configuration (environment variables + defaults).

use anyhow::Context;
use std::path::PathBuf;

pub const DEFAULT_SCHEMA_DIR: &str = "schemas";
pub const DEFAULT_SCHEMA_VERSION: &str = "v1.7";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Postgres URL. Without it records are kept in memory only.
    pub database_url: Option<String>,
    pub schema_dir: PathBuf,
    pub schema_version: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            schema_dir: PathBuf::from(DEFAULT_SCHEMA_DIR),
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
        }
    }
}

impl Settings {
    /// Reads settings from the process environment (after loading `.env`).
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Settings::default();

        let db_max_connections = match get("DB_MAX_CONNECTIONS") {
            Some(v) => v
                .parse::<u32>()
                .with_context(|| format!("DB_MAX_CONNECTIONS must be a positive integer, got {:?}", v))?
                .max(1),
            None => defaults.db_max_connections,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            schema_dir: get("SCHEMA_DIR").map(PathBuf::from).unwrap_or(defaults.schema_dir),
            schema_version: get("SCHEMA_VERSION").unwrap_or(defaults.schema_version),
            bind_addr: get("BIND_ADDR").unwrap_or(defaults.bind_addr),
            db_max_connections,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        assert_eq!(settings(&[]).unwrap(), Settings::default());
        assert_eq!(settings(&[("DATABASE_URL", "  ")]).unwrap().database_url, None);
    }

    #[test]
    fn overrides_are_read() {
        let s = settings(&[
            ("DATABASE_URL", "postgres://localhost/gregor"),
            ("SCHEMA_VERSION", "v1.8"),
            ("DB_MAX_CONNECTIONS", "0"),
        ])
        .unwrap();
        assert_eq!(s.database_url.as_deref(), Some("postgres://localhost/gregor"));
        assert_eq!(s.schema_version, "v1.8");
        assert_eq!(s.db_max_connections, 1);
    }

    #[test]
    fn bad_pool_size_is_an_error() {
        assert!(settings(&[("DB_MAX_CONNECTIONS", "many")]).is_err());
    }
}
