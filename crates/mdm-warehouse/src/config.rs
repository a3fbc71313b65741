//! Warehouse configuration resolved from defaults and the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Rejected configuration value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid configuration: {field} {reason}")]
pub struct ConfigError {
    pub field: &'static str,
    pub reason: String,
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseConfig {
    /// Root directory for mdm data.
    pub mdm_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of connections checked out at once.
    pub max_pool_size: usize,
    /// How long a caller waits for a free connection.
    pub acquire_timeout_ms: u64,
    /// Budget for one store operation, checked before commit.
    pub statement_timeout_ms: u64,
    /// Rows fetched per page while iterating a bar query.
    pub query_page_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let mdm_home = resolve_mdm_home();
        let db_path = mdm_home.join("data").join("marketdata.duckdb");
        Self {
            mdm_home,
            db_path,
            max_pool_size: 8,
            acquire_timeout_ms: 2_000,
            statement_timeout_ms: 5_000,
            query_page_size: 500,
        }
    }
}

impl WarehouseConfig {
    /// Defaults overridden by `MDM_DB_PATH`, `MDM_POOL_SIZE`,
    /// `MDM_ACQUIRE_TIMEOUT_MS` and `MDM_STATEMENT_TIMEOUT_MS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = env::var_os("MDM_DB_PATH").filter(|value| !value.is_empty()) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(value) = read_var("MDM_POOL_SIZE")? {
            config.max_pool_size = value;
        }
        if let Some(value) = read_var("MDM_ACQUIRE_TIMEOUT_MS")? {
            config.acquire_timeout_ms = value;
        }
        if let Some(value) = read_var("MDM_STATEMENT_TIMEOUT_MS")? {
            config.statement_timeout_ms = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let zero = |field| ConfigError {
            field,
            reason: String::from("must be greater than zero"),
        };
        if self.max_pool_size == 0 {
            return Err(zero("max_pool_size"));
        }
        if self.acquire_timeout_ms == 0 {
            return Err(zero("acquire_timeout_ms"));
        }
        if self.statement_timeout_ms == 0 {
            return Err(zero("statement_timeout_ms"));
        }
        if self.query_page_size == 0 {
            return Err(zero("query_page_size"));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }
}

fn read_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    let Ok(raw) = env::var(name) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse().map(Some).map_err(|_| ConfigError {
        field: name,
        reason: format!("expects an unsigned integer, got '{raw}'"),
    })
}

/// Resolve the mdm home directory from environment or default.
fn resolve_mdm_home() -> PathBuf {
    if let Some(path) = env::var_os("MDM_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".mdm");
    }

    PathBuf::from(".mdm")
}
