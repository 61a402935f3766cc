//! Test plan for the `courier-config` crate.
//!
//! These tests exercise the configuration loader across default handling,
//! file discovery, environment overrides, and validation behaviour.

use std::fs;
use std::path::{Path, PathBuf};

use serial_test::serial;
use tempfile::TempDir;

use courier_config::{load, AppConfig, BroadcastConfig, DatabaseConfig, HttpConfig};

const ENV_VARS_TO_RESET: &[&str] = &[
    "COURIER_CONFIG",
    "COURIER__DATABASE__MAX_CONNECTIONS",
    "COURIER__DATABASE__URL",
    "COURIER__HTTP__ADDRESS",
    "COURIER__HTTP__PORT",
    "COURIER__MESSAGING__EPHEMERAL",
    "COURIER__MESSAGING__OPERATION_TIMEOUT_MS",
    "COURIER__MESSAGING__BROADCAST__MAX_ATTEMPTS",
    "COURIER__MESSAGING__BROADCAST__CONCURRENCY",
];

struct TestContext {
    vars: Vec<(String, Option<String>)>,
    original_dir: Option<PathBuf>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            vars: Vec::new(),
            original_dir: None,
        }
    }

    fn reset_environment(&mut self) {
        for key in ENV_VARS_TO_RESET {
            self.remove_var(key);
        }
    }

    fn set_var(&mut self, key: &str, value: impl AsRef<str>) {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value.as_ref());
        self.vars.push((key.to_string(), previous));
    }

    fn remove_var(&mut self, key: &str) {
        let previous = std::env::var(key).ok();
        std::env::remove_var(key);
        self.vars.push((key.to_string(), previous));
    }

    fn set_current_dir(&mut self, dir: &Path) {
        if self.original_dir.is_none() {
            self.original_dir =
                Some(std::env::current_dir().expect("failed to capture current directory"));
        }
        std::env::set_current_dir(dir).expect("failed to set current directory");
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        if let Some(original) = self.original_dir.take() {
            let _ = std::env::set_current_dir(original);
        }

        while let Some((key, value)) = self.vars.pop() {
            match value {
                Some(val) => std::env::set_var(&key, val),
                None => std::env::remove_var(&key),
            }
        }
    }
}

fn write_config_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("failed to create config directories");
    }
    fs::write(path, contents).expect("failed to write config file");
}

fn isolated_context() -> (TempDir, TestContext) {
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let mut ctx = TestContext::new();
    ctx.reset_environment();
    ctx.set_current_dir(temp_dir.path());
    (temp_dir, ctx)
}

#[test]
#[serial]
fn load_uses_default_values_when_no_files_found() {
    let (_temp_dir, _ctx) = isolated_context();

    let config = load().expect("configuration load should succeed without files");
    let defaults = AppConfig::default();

    assert_eq!(config.http.address, defaults.http.address);
    assert_eq!(config.http.port, defaults.http.port);
    assert_eq!(config.database.url, defaults.database.url);
    assert_eq!(
        config.database.max_connections,
        defaults.database.max_connections
    );
    assert!(!config.messaging.ephemeral);
    assert_eq!(config.messaging.operation_timeout_ms, 5_000);
    assert_eq!(config.messaging.broadcast.max_attempts, 3);
    assert_eq!(config.messaging.realtime.channel_capacity, 256);
}

#[test]
#[serial]
fn load_picks_first_available_file_in_search_order() {
    let (temp_dir, _ctx) = isolated_context();

    write_config_file(
        temp_dir.path(),
        "courier.toml",
        r#"
        [http]
        port = 4242
        "#,
    );
    write_config_file(
        temp_dir.path(),
        "config/courier.toml",
        r#"
        [http]
        port = 5151
        "#,
    );

    let config = load().expect("configuration load should pick the first file");
    assert_eq!(config.http.port, 4242);
}

#[test]
#[serial]
fn load_merges_partial_file_with_defaults() {
    let (temp_dir, _ctx) = isolated_context();

    write_config_file(
        temp_dir.path(),
        "courier.toml",
        r#"
        [database]
        max_connections = 50

        [messaging.broadcast]
        concurrency = 2
        "#,
    );

    let config = load().expect("configuration load should succeed");
    let defaults = AppConfig::default();

    assert_eq!(config.http.port, defaults.http.port);
    assert_eq!(config.database.max_connections, 50);
    assert_eq!(config.database.url, defaults.database.url);
    assert_eq!(config.messaging.broadcast.concurrency, 2);
    assert_eq!(
        config.messaging.broadcast.recipient_timeout_ms,
        BroadcastConfig::default().recipient_timeout_ms
    );
}

#[test]
#[serial]
fn load_applies_environment_overrides() {
    let (temp_dir, mut ctx) = isolated_context();

    write_config_file(
        temp_dir.path(),
        "courier.toml",
        r#"
        [http]
        port = 3030
        "#,
    );

    ctx.set_var("COURIER__HTTP__PORT", "8080");
    ctx.set_var("COURIER__MESSAGING__EPHEMERAL", "true");

    let config = load().expect("configuration load should honour env overrides");
    assert_eq!(config.http.port, 8080);
    assert!(config.messaging.ephemeral);
}

#[test]
#[serial]
fn load_reads_explicit_config_path() {
    let (temp_dir, mut ctx) = isolated_context();

    write_config_file(
        temp_dir.path(),
        "elsewhere/custom.toml",
        r#"
        [messaging]
        operation_timeout_ms = 750
        "#,
    );
    let path = temp_dir.path().join("elsewhere/custom.toml");
    ctx.set_var("COURIER_CONFIG", path.display().to_string());

    let config = load().expect("explicit config path should load");
    assert_eq!(config.messaging.operation_timeout_ms, 750);
    assert_eq!(
        config.messaging.operation_timeout(),
        std::time::Duration::from_millis(750)
    );
}

#[test]
#[serial]
fn load_raises_zero_attempts_and_concurrency_to_one() {
    let (_temp_dir, mut ctx) = isolated_context();

    ctx.set_var("COURIER__MESSAGING__BROADCAST__MAX_ATTEMPTS", "0");
    ctx.set_var("COURIER__MESSAGING__BROADCAST__CONCURRENCY", "0");

    let config = load().expect("configuration load should succeed");
    assert_eq!(config.messaging.broadcast.max_attempts, 1);
    assert_eq!(config.messaging.broadcast.concurrency, 1);
}

#[test]
#[serial]
fn load_errors_on_invalid_toml_contents() {
    let (temp_dir, _ctx) = isolated_context();

    write_config_file(
        temp_dir.path(),
        "courier.toml",
        r#"
        [http]
        port = "not-a-number
        "#,
    );

    let error = load().expect_err("invalid TOML should cause load to fail");
    let message = error.to_string();
    assert!(
        message.contains("invalid configuration") || message.contains("unable to build configuration"),
        "unexpected error message: {message}"
    );
}

#[test]
fn database_config_detects_in_memory_urls() {
    let mut config = DatabaseConfig::default();
    assert!(!config.is_in_memory());

    config.url = "sqlite::memory:".to_string();
    assert!(config.is_in_memory());

    config.url = "sqlite://file:courier?mode=memory&cache=shared".to_string();
    assert!(config.is_in_memory());
}

#[test]
fn http_config_defaults_match_expected_host_and_port() {
    let defaults = HttpConfig::default();
    assert_eq!(defaults.address, "127.0.0.1");
    assert_eq!(defaults.port, 7070);
}
