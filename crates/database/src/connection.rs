//! Database connection management

use crate::types::{DatabaseError, DatabaseResult};
use courier_config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::{info, warn};

const EPHEMERAL_URL: &str = "sqlite::memory:";

/// How the store persists data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// File-backed. In-memory URLs are refused and there is no fallback.
    Durable,
    /// Process-local, lost on shutdown. Only for demos and tests.
    Ephemeral,
}

impl StoreMode {
    pub fn from_ephemeral_flag(ephemeral: bool) -> Self {
        if ephemeral {
            StoreMode::Ephemeral
        } else {
            StoreMode::Durable
        }
    }
}

/// Prepare and establish a database connection pool
pub async fn prepare_database(config: &DatabaseConfig, mode: StoreMode) -> DatabaseResult<SqlitePool> {
    match mode {
        StoreMode::Durable => prepare_durable(config).await,
        StoreMode::Ephemeral => prepare_ephemeral(config).await,
    }
}

async fn prepare_durable(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    if config.is_in_memory() {
        return Err(DatabaseError::ConnectionError(format!(
            "durable store refuses in-memory database url {}",
            config.url
        )));
    }

    ensure_sqlite_parent(&config.url).await?;

    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout())
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(config.busy_timeout())
        .connect_with(options)
        .await?;

    info!(url = %config.url, "database connection established");
    Ok(pool)
}

/// An in-memory database lives as long as its connection, so the pool keeps
/// exactly one connection open forever.
async fn prepare_ephemeral(config: &DatabaseConfig) -> DatabaseResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(EPHEMERAL_URL)?
        .busy_timeout(config.busy_timeout())
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .acquire_timeout(config.busy_timeout())
        .connect_with(options)
        .await?;

    warn!("using ephemeral in-memory store; data is lost on shutdown");
    Ok(pool)
}

/// Create the directory holding the SQLite file.
async fn ensure_sqlite_parent(url: &str) -> DatabaseResult<()> {
    let Some(sqlite_path) = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
    else {
        return Ok(());
    };

    let sqlite_path = sqlite_path.split('?').next().unwrap_or(sqlite_path);
    let path = Path::new(sqlite_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await.map_err(|e| {
                DatabaseError::Unavailable(format!(
                    "failed to create sqlite directory {}: {e}",
                    parent.display()
                ))
            })?;
        }
    }

    Ok(())
}

/// Database connection wrapper for easier management
#[derive(Clone)]
pub struct DatabaseConnection {
    pool: SqlitePool,
    mode: StoreMode,
}

impl DatabaseConnection {
    pub fn from_pool(pool: SqlitePool, mode: StoreMode) -> Self {
        Self { pool, mode }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    /// Check that the store answers a trivial query.
    pub async fn ping(&self) -> DatabaseResult<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
