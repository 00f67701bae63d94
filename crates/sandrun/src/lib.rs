//! A library for sandboxed multi-language code execution.
//!
//! Sandrun takes a snippet of source code, a language identifier and optional
//! standard input, runs the code in a throwaway sandbox, and returns a
//! normalized result. Failures come back with a beginner-friendly hint and,
//! when an explanation service is configured, a detailed analysis.
//!
//! # Features
//!
//! - **Container sandboxing** with no network, capped memory and processes, and dropped capabilities.
//! - **Local fallback** in a scratch directory with a process-group watchdog when no container daemon is reachable.
//! - **Multi-language** support for compiled and interpreted languages, configured in TOML.
//! - **Error explanations** from per-language patterns plus an optional chat completions service.
//! - **Bounded concurrency** with one private workspace per request.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, LanguageProfile};
pub use explain::{ChatCompletionsExplainer, Explainer, ExplanationService, FailureKind};
pub use registry::{LanguageId, LanguageRegistry, LanguageSummary, ValidationError};
pub use runner::{ExecuteError, Runner, RunnerError};
pub use sandbox::{
    ContainerBackend, LocalBackend, SandboxBackend, SandboxError, Workspace, WorkspacePool,
};
pub use types::{
    DetailedAnalysis, ErrorExplanation, ExecutionRequest, ExecutionResult, ExecutionStatus,
    MemoryLimit, RawExecutionOutcome,
};

pub mod config;
pub mod explain;
pub mod registry;
pub mod runner;
pub mod sandbox;
pub mod types;
