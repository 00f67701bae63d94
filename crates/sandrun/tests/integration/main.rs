//! Integration tests for sandrun
//!
//! Local backend tests need the language toolchains (python3, node, javac,
//! g++, gcc, bash) on PATH. Container tests need a reachable Docker daemon
//! with the configured images pulled.
//! Run with: cargo test -p sandrun --features integration-tests
//!
//! Tests that need toolchains or Docker are marked `#[ignore]`. To include them:
//!    cargo test -p sandrun --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::fs;
use std::path::PathBuf;

use sandrun::config::{BackendMode, Config};
use sandrun::Runner;

mod config_loading;
mod container_execution;
mod local_execution;
mod scenarios;
mod templates;

const FIXTURES_PATH: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures");

/// Helper to get fixture file content
pub(crate) fn fixture_source(name: &str) -> String {
    let path = format!("{FIXTURES_PATH}/sources/{name}");
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("Failed to read fixture {path}: {e}"))
}

pub(crate) fn fixture_config(name: &str) -> PathBuf {
    PathBuf::from(format!("{FIXTURES_PATH}/configs/{name}"))
}

/// Default configuration pinned to one backend, without the explanation service
pub(crate) fn test_config(backend: BackendMode) -> Config {
    let mut config = Config::default();
    config.backend = backend;
    config.allow_local_fallback = false;
    config.explainer.enabled = false;
    config
}

pub(crate) fn local_runner() -> Runner {
    Runner::new(test_config(BackendMode::Local)).expect("Failed to create local runner")
}

pub(crate) fn container_runner() -> Runner {
    let mut config = test_config(BackendMode::Container);
    config.container.pull_missing_images = true;
    Runner::new(config).expect("Failed to create container runner")
}
