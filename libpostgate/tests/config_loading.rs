//! Configuration file loading and environment overrides

use std::fs;
use std::time::Duration;

use libpostgate::config::{resolve_config_path, Config};
use libpostgate::error::{ConfigError, GateError};
use serial_test::serial;
use tempfile::TempDir;

const SAMPLE: &str = r#"
[idempotency]
ttl_minutes = 30

[dispatch]
request_timeout = "5s"
max_attempts = 2
retry_delay = "250ms"

[content]
strip_all_html = true

[channels.news]
platform = "telegram"

[channels.news.auth]
bot_token = "123:abc"
chat_id = "@news"
"#;

fn write_config(content: &str) -> (TempDir, std::path::PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.toml");
    fs::write(&path, content).unwrap();
    (temp_dir, path)
}

fn clear_env() {
    std::env::remove_var("POSTGATE_CONFIG");
    std::env::remove_var("POSTGATE_IDEMPOTENCY_TTL");
    std::env::remove_var("POSTGATE_REQUEST_TIMEOUT");
}

#[test]
#[serial]
fn test_load_from_path() {
    clear_env();
    let (_dir, path) = write_config(SAMPLE);

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.idempotency.ttl(), Duration::from_secs(30 * 60));
    assert_eq!(config.dispatch.request_timeout().unwrap(), Duration::from_secs(5));
    assert_eq!(config.dispatch.retry_delay().unwrap(), Duration::from_millis(250));
    assert_eq!(config.dispatch.max_attempts, 2);
    assert!(config.content.strip_all_html);
    assert_eq!(config.channels["news"].platform, "telegram");
    assert_eq!(config.channels["news"].auth["chat_id"], "@news");
}

#[test]
#[serial]
fn test_config_env_var_selects_file() {
    clear_env();
    let (_dir, path) = write_config(SAMPLE);
    std::env::set_var("POSTGATE_CONFIG", &path);

    assert_eq!(resolve_config_path().unwrap(), path);
    let config = Config::load().unwrap();
    assert_eq!(config.idempotency.ttl_minutes, 30);

    clear_env();
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    std::env::set_var("POSTGATE_CONFIG", temp_dir.path().join("absent.toml"));

    let config = Config::load().unwrap();
    assert_eq!(config.idempotency.ttl_minutes, 10);
    assert_eq!(config.dispatch.max_attempts, 3);
    assert!(config.channels.is_empty());

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let (_dir, path) = write_config(SAMPLE);
    std::env::set_var("POSTGATE_IDEMPOTENCY_TTL", "60");
    std::env::set_var("POSTGATE_REQUEST_TIMEOUT", "2m");

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(config.idempotency.ttl_minutes, 60);
    assert_eq!(config.dispatch.request_timeout().unwrap(), Duration::from_secs(120));

    clear_env();
}

#[test]
#[serial]
fn test_out_of_range_ttl_override_is_rejected() {
    clear_env();
    let (_dir, path) = write_config(SAMPLE);
    std::env::set_var("POSTGATE_IDEMPOTENCY_TTL", "5000");

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, GateError::Config(ConfigError::Invalid(_))));

    clear_env();
}

#[test]
#[serial]
fn test_malformed_file_is_a_parse_error() {
    clear_env();
    let (_dir, path) = write_config("[idempotency\nttl_minutes = ");

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, GateError::Config(ConfigError::ParseError(_))));
}

#[test]
#[serial]
fn test_channel_without_platform_is_rejected() {
    clear_env();
    let (_dir, path) = write_config("[channels.news]\nplatform = \"\"\n");

    let err = Config::load_from_path(&path).unwrap_err();
    assert!(matches!(err, GateError::Config(ConfigError::MissingField(_))));
}
