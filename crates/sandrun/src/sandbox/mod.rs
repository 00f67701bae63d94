//! Sandbox backends
//!
//! A backend runs one command inside a workspace under a wall-clock deadline
//! and reports what happened. Two implementations exist:
//!
//! - [`ContainerBackend`] starts an ephemeral, network-less container per
//!   command through the Docker Engine API.
//! - [`LocalBackend`] spawns the command as a host process in its own process
//!   group. It offers much weaker isolation and is meant as a fallback.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use crate::sandbox::capture::{OutputBuffer, TRUNCATION_MARKER, read_capped};
pub use crate::sandbox::container::ContainerBackend;
pub use crate::sandbox::local::LocalBackend;
pub use crate::sandbox::workspace::{Workspace, WorkspacePool};
use crate::config::LanguageProfile;
use crate::types::RawExecutionOutcome;

mod capture;
mod container;
mod local;
mod workspace;

/// Errors raised by sandbox infrastructure, never by the submitted code
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The backend cannot serve this profile at all (daemon down, image missing)
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),

    /// The sandbox could not be set up; the submitted code never ran
    #[error("failed to set up sandbox: {0}")]
    Setup(String),

    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("empty command")]
    EmptyCommand,

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("no free execution slot")]
    PoolExhausted,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Whether another backend may retry the same request
    pub fn allows_fallback(&self) -> bool {
        matches!(self, SandboxError::Unavailable(_) | SandboxError::Setup(_))
    }
}

/// One command to run inside a workspace
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Profile of the language being run
    pub profile: &'a LanguageProfile,
    /// Workspace holding the source and artifacts
    pub workspace: &'a Workspace,
    /// Program and arguments, placeholders already expanded
    pub command: &'a [String],
    /// Extra environment variables
    pub env: &'a HashMap<String, String>,
    /// Data for standard input
    pub stdin: &'a [u8],
    /// Wall-clock limit, measured from process start
    pub deadline: Duration,
}

/// Runs commands in isolation
#[async_trait]
pub trait SandboxBackend: Send + Sync + fmt::Debug {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Check that the backend can run commands for `profile`.
    ///
    /// Returns [`SandboxError::Unavailable`] when it cannot, in which case the
    /// caller may choose another backend.
    async fn prepare(&self, profile: &LanguageProfile) -> Result<(), SandboxError>;

    /// Run one command to completion or until its deadline.
    ///
    /// A non-zero exit or a timeout is a successful call reported through
    /// [`RawExecutionOutcome`]. Errors are reserved for infrastructure faults.
    async fn run(&self, invocation: Invocation<'_>) -> Result<RawExecutionOutcome, SandboxError>;
}
