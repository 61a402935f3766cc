//! Shared application state for the gateway

use courier_config::MessagingConfig;
use courier_messaging::{MessagingCore, SqlDirectory};
use sqlx::SqlitePool;

/// Messaging core as seen by the HTTP and WebSocket handlers.
pub type Core = MessagingCore<SqlDirectory>;

/// Shared application state
#[derive(Clone)]
pub struct GatewayState {
    /// Database connection pool
    pub pool: SqlitePool,
    /// Registry, store, dispatcher, broadcaster and fan-out hub
    pub core: Core,
}

impl GatewayState {
    pub fn new(pool: SqlitePool, core: Core) -> Self {
        Self { pool, core }
    }

    /// Build the core over `pool`, resolving participants from the same store.
    pub fn from_pool(pool: SqlitePool, config: &MessagingConfig) -> Self {
        let core = MessagingCore::new(pool.clone(), SqlDirectory::new(pool.clone()), config);
        Self::new(pool, core)
    }

    pub fn core(&self) -> &Core {
        &self.core
    }
}
