//! `DuckDB` connection handle and bounded connection pool.
//!
//! One database instance is opened per handle; every checked-out connection
//! is a clone of it, so all connections observe the same data. A
//! [`PooledConnection`] returns to the pool when dropped, on every exit path.

use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use ::duckdb::Connection;
use tracing::{debug, warn};

use crate::config::WarehouseConfig;
use crate::error::StoreFault;

struct PoolState {
    idle: Vec<Connection>,
    checked_out: usize,
}

struct PoolInner {
    db_path: Option<PathBuf>,
    root: Mutex<Connection>,
    max_pool_size: usize,
    acquire_timeout: Duration,
    statement_timeout: Duration,
    query_page_size: usize,
    state: Mutex<PoolState>,
    available: Condvar,
    ddl: Mutex<()>,
}

/// Opaque connection handle shared by the registry, bar store and schema manager.
#[derive(Clone)]
pub struct DuckDbConnectionManager {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for DuckDbConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbConnectionManager")
            .field("db_path", &self.inner.db_path)
            .field("max_pool_size", &self.inner.max_pool_size)
            .finish_non_exhaustive()
    }
}

impl DuckDbConnectionManager {
    /// Open (or create) the database file named by `config.db_path`.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the parent directory
    /// cannot be created or the database cannot be opened.
    pub fn open(config: &WarehouseConfig) -> Result<Self, StoreFault> {
        validate(config)?;
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let root = Connection::open(&config.db_path)?;
        configure_connection(&root)?;
        debug!(db_path = %config.db_path.display(), "opened duckdb database");
        Ok(Self::from_root(root, Some(config.db_path.clone()), config))
    }

    /// Open a private in-memory database; `config.db_path` is ignored.
    pub fn in_memory(config: &WarehouseConfig) -> Result<Self, StoreFault> {
        validate(config)?;
        let root = Connection::open_in_memory()?;
        configure_connection(&root)?;
        Ok(Self::from_root(root, None, config))
    }

    fn from_root(root: Connection, db_path: Option<PathBuf>, config: &WarehouseConfig) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                db_path,
                root: Mutex::new(root),
                max_pool_size: config.max_pool_size,
                acquire_timeout: config.acquire_timeout(),
                statement_timeout: config.statement_timeout(),
                query_page_size: config.query_page_size,
                state: Mutex::new(PoolState {
                    idle: Vec::new(),
                    checked_out: 0,
                }),
                available: Condvar::new(),
                ddl: Mutex::new(()),
            }),
        }
    }

    /// Held while schema DDL runs, so initialisers sharing this handle take
    /// turns instead of racing on the catalog.
    pub(crate) fn ddl_guard(&self) -> MutexGuard<'_, ()> {
        lock(&self.inner.ddl)
    }

    /// Acquire a connection, waiting up to the configured acquire timeout.
    ///
    /// # Errors
    /// Returns [`StoreFault::PoolTimeout`] when every connection stays checked
    /// out for the whole wait, or a `DuckDB` error if a new connection cannot
    /// be cloned from the database.
    pub fn acquire(&self) -> Result<PooledConnection, StoreFault> {
        let started = Instant::now();
        let deadline = started + self.inner.acquire_timeout;
        let mut state = lock(&self.inner.state);

        loop {
            if let Some(connection) = state.idle.pop() {
                state.checked_out += 1;
                return Ok(self.wrap(connection));
            }

            if state.checked_out < self.inner.max_pool_size {
                state.checked_out += 1;
                drop(state);
                return match lock(&self.inner.root).try_clone() {
                    Ok(connection) => Ok(self.wrap(connection)),
                    Err(error) => {
                        self.release_slot(None);
                        Err(StoreFault::DuckDb(error))
                    }
                };
            }

            let now = Instant::now();
            if now >= deadline {
                let waited_ms = duration_ms(now.duration_since(started));
                warn!(
                    waited_ms,
                    pool_size = self.inner.max_pool_size,
                    "connection pool exhausted"
                );
                return Err(StoreFault::PoolTimeout {
                    waited_ms,
                    pool_size: self.inner.max_pool_size,
                });
            }

            state = self
                .inner
                .available
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    /// Path to the database file, `None` for in-memory databases.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.inner.db_path.as_deref()
    }

    #[must_use]
    pub fn max_pool_size(&self) -> usize {
        self.inner.max_pool_size
    }

    #[must_use]
    pub fn query_page_size(&self) -> usize {
        self.inner.query_page_size
    }

    /// Connections currently checked out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        lock(&self.inner.state).checked_out
    }

    fn wrap(&self, connection: Connection) -> PooledConnection {
        PooledConnection {
            pool: self.clone(),
            statement_timeout: self.inner.statement_timeout,
            connection: Some(connection),
        }
    }

    fn release_slot(&self, connection: Option<Connection>) {
        let mut state = lock(&self.inner.state);
        state.checked_out = state.checked_out.saturating_sub(1);
        if let Some(connection) = connection {
            if state.idle.len() < self.inner.max_pool_size {
                state.idle.push(connection);
            }
        }
        drop(state);
        self.inner.available.notify_one();
    }
}

/// A pooled connection that returns to the pool when dropped.
pub struct PooledConnection {
    pool: DuckDbConnectionManager,
    statement_timeout: Duration,
    connection: Option<Connection>,
}

impl PooledConnection {
    /// Run `work` inside a transaction.
    ///
    /// Commits only when `work` succeeds within the statement budget; any
    /// error or an exceeded budget rolls the whole unit back.
    pub fn transaction<T, E>(&self, work: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreFault>,
    {
        let connection: &Connection = self;
        let started = Instant::now();
        connection
            .execute_batch("BEGIN TRANSACTION")
            .map_err(|error| E::from(StoreFault::DuckDb(error)))?;
        let result = work(connection).and_then(|value| {
            ensure_timeout(started, self.statement_timeout)?;
            Ok(value)
        });
        finalize_transaction(connection, result)
    }

    /// Run read-only `work`, failing if it overran the statement budget.
    pub fn read<T, E>(&self, work: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreFault>,
    {
        let started = Instant::now();
        let value = work(self.deref())?;
        ensure_timeout(started, self.statement_timeout)?;
        Ok(value)
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Self::Target {
        match self.connection.as_ref() {
            Some(connection) => connection,
            None => unreachable!("pooled connection is only taken on drop"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let connection = self.connection.take();
        self.pool.release_slot(connection);
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T, E>(connection: &Connection, result: Result<T, E>) -> Result<T, E>
where
    E: From<StoreFault>,
{
    match result {
        Ok(value) => {
            connection
                .execute_batch("COMMIT")
                .map_err(|error| E::from(StoreFault::DuckDb(error)))?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Ensure that the operation has not exceeded its budget.
pub(crate) fn ensure_timeout(started: Instant, timeout: Duration) -> Result<(), StoreFault> {
    if started.elapsed() > timeout {
        return Err(StoreFault::StatementTimeout {
            timeout_ms: duration_ms(timeout),
        });
    }
    Ok(())
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u128::from(u64::MAX)) as u64
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn validate(config: &WarehouseConfig) -> Result<(), StoreFault> {
    config.validate().map_err(|error| {
        StoreFault::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            error.to_string(),
        ))
    })
}

fn configure_connection(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch("PRAGMA disable_progress_bar;")
}
