//! Session manager configuration from TOML files and the environment

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use tasker_sessions::config::{ConfigLoader, ConfigurationError, SessionManagerConfig};
use tasker_sessions::orchestration::{CacheSessionStorage, Services, SessionManager};
use tokio_test::{assert_err, assert_ok};

fn write_toml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_configures_the_session_manager() {
    let file = write_toml(
        r#"
id = "reporting"
max_concurrency_level = 6
session_ttl_seconds = 3600
cache_max_capacity = 50
"#,
    );

    let config = assert_ok!(ConfigLoader::new()
        .with_file(file.path())
        .with_env_prefix("TASKER_SESSIONS_IT_FILE")
        .load());

    assert_eq!(config.id, "reporting");
    assert_eq!(config.session_ttl(), Duration::from_secs(3600));

    let storage = CacheSessionStorage::<(), ()>::from_config(&config);
    assert_eq!(storage.ttl(), Duration::from_secs(3600));

    let manager: SessionManager<(), ()> =
        SessionManager::new(config, Arc::new(storage), Services::default()).unwrap();
    assert_eq!(manager.available_global_permits(), 6);
    assert_eq!(manager.id(), "reporting");
}

#[test]
fn test_partial_file_keeps_defaults() {
    let file = write_toml("max_concurrency_level = 2\n");
    let config = assert_ok!(ConfigLoader::new()
        .with_file(file.path())
        .with_env_prefix("TASKER_SESSIONS_IT_PARTIAL")
        .load());

    let defaults = SessionManagerConfig::default();
    assert_eq!(config.max_concurrency_level, 2);
    assert_eq!(config.session_ttl_seconds, defaults.session_ttl_seconds);
    assert_eq!(config.cache_max_capacity, defaults.cache_max_capacity);
    assert!(!config.id.is_empty());
}

#[test]
fn test_environment_overrides_apply_on_top_of_file() {
    let file = write_toml("id = \"from-file\"\nsession_ttl_seconds = 10\n");

    std::env::set_var("TASKER_SESSIONS_IT_ENV__SESSION_TTL_SECONDS", "90");
    std::env::set_var("TASKER_SESSIONS_IT_ENV__CACHE_MAX_CAPACITY", "7");
    let result = ConfigLoader::new()
        .with_file(file.path())
        .with_env_prefix("TASKER_SESSIONS_IT_ENV")
        .load();
    std::env::remove_var("TASKER_SESSIONS_IT_ENV__SESSION_TTL_SECONDS");
    std::env::remove_var("TASKER_SESSIONS_IT_ENV__CACHE_MAX_CAPACITY");

    let config = assert_ok!(result);
    assert_eq!(config.id, "from-file");
    assert_eq!(config.session_ttl_seconds, 90);
    assert_eq!(config.cache_max_capacity, 7);
}

#[test]
fn test_malformed_file_is_a_parse_error() {
    let file = write_toml("max_concurrency_level = [not toml");
    let result = ConfigLoader::new()
        .with_file(file.path())
        .with_env_prefix("TASKER_SESSIONS_IT_MALFORMED")
        .load();
    let error = assert_err!(result);
    assert!(matches!(error, ConfigurationError::ParseError { .. }));
}

#[test]
fn test_zero_capacity_is_rejected() {
    let file = write_toml("cache_max_capacity = 0\n");
    let result = ConfigLoader::new()
        .with_file(file.path())
        .with_env_prefix("TASKER_SESSIONS_IT_ZERO")
        .load();
    assert!(matches!(
        result,
        Err(ConfigurationError::InvalidValue { ref field, .. }) if field == "cache_max_capacity"
    ));
}
