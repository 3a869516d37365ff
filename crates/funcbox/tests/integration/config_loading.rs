use std::path::PathBuf;

use funcbox::config::{Config, ConfigError};
use funcbox::types::IsolationPolicy;

use super::fixture_config;

#[test]
fn test_load_valid_config() {
    let config = Config::from_file(fixture_config("valid_full.toml")).expect("Failed to load config");

    assert_eq!(
        config.workspace_root,
        Some(PathBuf::from("/var/tmp/funcbox-test"))
    );
    assert_eq!(config.default_timeout_ms, 2000);
    assert_eq!(config.max_timeout_ms, 10000);
    assert_eq!(config.max_concurrent, 4);
    assert_eq!(config.max_log_lines, 200);
    assert_eq!(config.isolation, IsolationPolicy::ScrubbedEnv);
    assert_eq!(config.interpreters["python"].command, vec!["python3", "-u"]);
    assert_eq!(config.interpreters["javascript"].command, vec!["node"]);
}

#[test]
fn test_load_minimal_config() {
    let config =
        Config::from_file(fixture_config("valid_minimal.toml")).expect("Failed to load config");

    assert_eq!(config.default_timeout_ms, 1500);
    assert_eq!(config.max_timeout_ms, 60_000);
    assert_eq!(config.isolation, IsolationPolicy::Process);
    assert!(config.interpreters.is_empty());
}

#[test]
fn test_load_layers_file_over_defaults() {
    let path = fixture_config("valid_minimal.toml");
    let config = Config::load(Some(std::path::Path::new(&path))).expect("Failed to load config");

    assert_eq!(config.default_timeout_ms, 1500);
    assert_eq!(config.max_log_lines, 1000);
}

#[test]
fn test_load_invalid_default_above_max() {
    let result = Config::from_file(fixture_config("invalid_default_above_max.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_unknown_runtime() {
    match Config::from_file(fixture_config("invalid_unknown_runtime.toml")) {
        Err(ConfigError::Invalid(msg)) => assert!(msg.contains("ruby")),
        other => panic!("expected Invalid error, got {other:?}"),
    }
}

#[test]
fn test_load_invalid_empty_command() {
    let result = Config::from_file(fixture_config("invalid_empty_command.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_invalid_isolation() {
    let result = Config::from_file(fixture_config("invalid_isolation.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file(fixture_config("does_not_exist.toml"));
    assert!(result.is_err());
}
