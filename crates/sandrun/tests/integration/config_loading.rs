use sandrun::config::{BackendMode, Config, ConfigError};
use sandrun::{LanguageId, LanguageRegistry};

use super::fixture_config;

#[test]
fn test_load_partial_override() {
    let config = Config::from_file(fixture_config("local_only.toml")).expect("Failed to load config");

    assert_eq!(config.backend, BackendMode::Local);
    assert_eq!(config.max_concurrent, 2);
    assert!(!config.explainer.enabled);

    // Overridden key, untouched siblings keep their defaults
    let python = &config.languages["python"];
    assert_eq!(python.timeout_seconds, 3);
    assert_eq!(python.image, "python:3.11-slim");
    assert!(!python.hints.is_empty());

    let registry = LanguageRegistry::from_config(&config).expect("Failed to build registry");
    assert_eq!(registry.len(), LanguageId::ALL.len());
}

#[test]
fn test_load_unknown_language() {
    let result = Config::from_file(fixture_config("invalid_unknown_language.toml"));
    assert!(matches!(result, Err(ConfigError::UnknownLanguage(ref id)) if id == "cobol"));
}

#[test]
fn test_load_zero_timeout() {
    let result = Config::from_file(fixture_config("invalid_zero_timeout.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_zero_concurrency() {
    let result = Config::from_file(fixture_config("invalid_zero_concurrency.toml"));
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn test_load_missing_file() {
    let result = Config::from_file(fixture_config("does_not_exist.toml"));
    assert!(matches!(result, Err(ConfigError::Parse(_))));
}
