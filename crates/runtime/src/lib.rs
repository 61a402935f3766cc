use anyhow::{Context, Result};
use courier_config::AppConfig;
use courier_database::{initialize_database, StoreMode};
use courier_messaging::{MessagingCore, SqlDirectory};
use sqlx::SqlitePool;
use tracing::info;

pub mod telemetry {
    use anyhow::Result;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_env_filter(env_filter)
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub mode: StoreMode,
    pub core: MessagingCore<SqlDirectory>,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let mode = StoreMode::from_ephemeral_flag(config.messaging.ephemeral);
        let db_pool = initialize_database(&config.database, mode)
            .await
            .with_context(|| format!("failed to open the {mode:?} message store"))?;

        let directory = SqlDirectory::new(db_pool.clone());
        let core = MessagingCore::new(db_pool.clone(), directory, &config.messaging);

        info!(
            mode = ?mode,
            operation_timeout_ms = config.messaging.operation_timeout_ms,
            broadcast_concurrency = config.messaging.broadcast.concurrency,
            "messaging core ready"
        );

        Ok(Self { db_pool, mode, core })
    }

    /// Close realtime subscriptions, then the pool.
    pub async fn shutdown(&self) {
        self.core.shutdown();
        self.db_pool.close().await;
        info!("backend services stopped");
    }
}

pub async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(?error, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
}
