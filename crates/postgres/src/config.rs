//! Database connection settings read from the environment.

use crate::error::DatabaseError;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5432;
pub const DEFAULT_USER: &str = "postgres";
pub const DEFAULT_NAME: &str = "postgres";
pub const DEFAULT_POOL_MAX: usize = 4;

#[derive(Clone, PartialEq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub pool_max: usize,
    /// Bound on waiting for, creating and recycling pooled connections
    pub pool_timeout: Duration,
}

impl DatabaseConfig {
    /// Read `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` and
    /// `DB_POOL_MAX`, falling back to local defaults
    pub fn from_env() -> Result<Self, DatabaseError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, DatabaseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match get("DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| DatabaseError::Config(format!("DB_PORT is not a valid port: {}", raw)))?,
            None => DEFAULT_PORT,
        };

        let pool_max = match get("DB_POOL_MAX") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    DatabaseError::Config(format!("DB_POOL_MAX must be a positive integer: {}", raw))
                })?,
            None => DEFAULT_POOL_MAX,
        };

        Ok(Self {
            host: get("DB_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            user: get("DB_USER").unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: lookup("DB_PASSWORD").unwrap_or_default(),
            dbname: get("DB_NAME").unwrap_or_else(|| DEFAULT_NAME.to_string()),
            pool_max,
            pool_timeout: Duration::from_secs(10),
        })
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            dbname: DEFAULT_NAME.to_string(),
            pool_max: DEFAULT_POOL_MAX,
            pool_timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("dbname", &self.dbname)
            .field("pool_max", &self.pool_max)
            .finish()
    }
}
