use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "courier.toml",
    "config/courier.toml",
    "crates/config/courier.toml",
    "../courier.toml",
    "../config/courier.toml",
    "../crates/config/courier.toml",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub address: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 7070,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    #[serde(default = "DatabaseConfig::default_busy_timeout")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    const fn default_busy_timeout() -> u64 {
        5_000
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Whether the URL points at a process-local in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://courier.db".to_string(),
            max_connections: 10,
            busy_timeout_ms: Self::default_busy_timeout(),
        }
    }
}

/// Settings for the messaging core.
///
/// ```
/// use courier_config::MessagingConfig;
///
/// let messaging = MessagingConfig::default();
/// assert!(!messaging.ephemeral);
/// assert_eq!(messaging.operation_timeout_ms, 5_000);
/// assert_eq!(messaging.notifications.poll_interval_seconds, 30);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Opt into a non-durable in-memory store. Never enabled implicitly.
    #[serde(default)]
    pub ephemeral: bool,
    #[serde(default = "MessagingConfig::default_operation_timeout")]
    pub operation_timeout_ms: u64,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

impl MessagingConfig {
    const fn default_operation_timeout() -> u64 {
        5_000
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            ephemeral: false,
            operation_timeout_ms: Self::default_operation_timeout(),
            broadcast: BroadcastConfig::default(),
            notifications: NotificationConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "BroadcastConfig::default_recipient_timeout")]
    pub recipient_timeout_ms: u64,
    #[serde(default = "BroadcastConfig::default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "BroadcastConfig::default_retry_backoff")]
    pub retry_backoff_ms: u64,
    #[serde(default = "BroadcastConfig::default_concurrency")]
    pub concurrency: usize,
}

impl BroadcastConfig {
    const fn default_recipient_timeout() -> u64 {
        3_000
    }

    const fn default_max_attempts() -> u32 {
        3
    }

    const fn default_retry_backoff() -> u64 {
        100
    }

    const fn default_concurrency() -> usize {
        8
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            recipient_timeout_ms: Self::default_recipient_timeout(),
            max_attempts: Self::default_max_attempts(),
            retry_backoff_ms: Self::default_retry_backoff(),
            concurrency: Self::default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "NotificationConfig::default_poll_interval")]
    pub poll_interval_seconds: u64,
}

impl NotificationConfig {
    const fn default_poll_interval() -> u64 {
        30
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: Self::default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "RealtimeConfig::default_channel_capacity")]
    pub channel_capacity: usize,
}

impl RealtimeConfig {
    const fn default_channel_capacity() -> usize {
        256
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: Self::default_channel_capacity(),
        }
    }
}

fn clamp_to_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

/// Load the application configuration by combining defaults, files, and environment overrides.
///
/// ```
/// use courier_config::load;
///
/// std::env::remove_var("COURIER_CONFIG");
///
/// let config = load().expect("configuration should load with defaults");
/// assert!(!config.http.address.is_empty());
/// ```
pub fn load() -> anyhow::Result<AppConfig> {
    let defaults = AppConfig::default();
    let messaging = &defaults.messaging;

    let builder = config::Config::builder()
        .set_default("http.address", defaults.http.address.clone())?
        .set_default("http.port", i64::from(defaults.http.port))?
        .set_default("database.url", defaults.database.url.clone())?
        .set_default(
            "database.max_connections",
            i64::from(defaults.database.max_connections),
        )?
        .set_default(
            "database.busy_timeout_ms",
            clamp_to_i64(defaults.database.busy_timeout_ms),
        )?
        .set_default("messaging.ephemeral", messaging.ephemeral)?
        .set_default(
            "messaging.operation_timeout_ms",
            clamp_to_i64(messaging.operation_timeout_ms),
        )?
        .set_default(
            "messaging.broadcast.recipient_timeout_ms",
            clamp_to_i64(messaging.broadcast.recipient_timeout_ms),
        )?
        .set_default(
            "messaging.broadcast.max_attempts",
            i64::from(messaging.broadcast.max_attempts),
        )?
        .set_default(
            "messaging.broadcast.retry_backoff_ms",
            clamp_to_i64(messaging.broadcast.retry_backoff_ms),
        )?
        .set_default(
            "messaging.broadcast.concurrency",
            clamp_to_i64(messaging.broadcast.concurrency),
        )?
        .set_default(
            "messaging.notifications.poll_interval_seconds",
            clamp_to_i64(messaging.notifications.poll_interval_seconds),
        )?
        .set_default(
            "messaging.realtime.channel_capacity",
            clamp_to_i64(messaging.realtime.channel_capacity),
        )?;

    let environment_overrides = config::Environment::with_prefix("COURIER")
        .prefix_separator("__")
        .separator("__");

    let mut builder = builder;
    let mut config_file_attached = false;

    if let Ok(path) = std::env::var("COURIER_CONFIG") {
        builder = builder.add_source(config::File::from(PathBuf::from(&path)));
        config_file_attached = true;
        debug!(path, "loading configuration via COURIER_CONFIG");
    } else if let Ok(cwd) = std::env::current_dir() {
        let fallback = DEFAULT_CONFIG_FILES
            .iter()
            .map(|candidate| cwd.join(candidate))
            .find(|path| path.exists());

        if let Some(path) = fallback {
            debug!(path = %path.display(), "loading configuration file");
            builder = builder.add_source(config::File::from(path));
            config_file_attached = true;
        }
    }

    if !config_file_attached {
        debug!("no configuration file found, relying on defaults and environment overrides");
    }

    builder = builder.add_source(environment_overrides);

    let cfg = builder.build().context("unable to build configuration")?;

    let mut config = cfg
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")?;

    if config.messaging.broadcast.max_attempts == 0 {
        config.messaging.broadcast.max_attempts = 1;
    }
    if config.messaging.broadcast.concurrency == 0 {
        config.messaging.broadcast.concurrency = 1;
    }
    if config.messaging.realtime.channel_capacity == 0 {
        config.messaging.realtime.channel_capacity = 1;
    }

    debug!(?config, "loaded backend configuration");
    Ok(config)
}
