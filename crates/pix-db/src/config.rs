//! Database configuration.

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout_secs: 10,
            idle_timeout_secs: 600,
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> DbResult<Self> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| DbError::config("DATABASE_URL not set"))?;
        let defaults = Self::new(url);

        Ok(Self {
            max_connections: env_or("DATABASE_MAX_CONNECTIONS", defaults.max_connections),
            min_connections: env_or("DATABASE_MIN_CONNECTIONS", defaults.min_connections),
            connect_timeout_secs: env_or(
                "DATABASE_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout_secs,
            ),
            idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            ..defaults
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
