//! Code runner for Sandrun
//!
//! [`Runner`] is the public entry point. It validates a request, reserves a
//! workspace, picks a sandbox backend, drives the compile and run phases on a
//! worker task, and attaches an explanation to failures.

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub use crate::runner::compile::{CompileResult, compile};
pub use crate::runner::execute::execute;

mod compile;
mod execute;

use crate::{
    config::{BackendMode, Config, ConfigError, LanguageProfile},
    explain::{CollaboratorError, Explainer, FailureKind},
    registry::{LanguageId, LanguageRegistry, LanguageSummary, ValidationError},
    sandbox::{ContainerBackend, LocalBackend, SandboxBackend, SandboxError, Workspace, WorkspacePool},
    types::{ExecutionRequest, ExecutionResult, ExecutionStatus, round_seconds},
};

/// Errors that reject a request before it runs
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Every execution slot stayed busy for the whole queue timeout
    #[error("too many executions in progress, try again later")]
    Busy,
}

/// Errors that occur while building a runner
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to set up explainer: {0}")]
    Explainer(#[from] CollaboratorError),

    #[error("no sandbox backend available: {0}")]
    NoBackend(String),
}

/// High-level runner for code execution
///
/// Cheap to clone; clones share the registry, backends and slot pool.
#[derive(Debug, Clone)]
pub struct Runner {
    inner: Arc<RunnerInner>,
}

#[derive(Debug)]
struct RunnerInner {
    config: Config,
    registry: LanguageRegistry,
    pool: WorkspacePool,
    /// Preferred backend
    primary: Option<Arc<dyn SandboxBackend>>,
    /// Used when the primary backend cannot serve a request
    fallback: Option<Arc<dyn SandboxBackend>>,
    explainer: Explainer,
}

impl Runner {
    /// Create a runner with backends chosen by `config.backend`
    pub fn new(config: Config) -> Result<Self, RunnerError> {
        let local = || -> Arc<dyn SandboxBackend> {
            Arc::new(LocalBackend::new(config.local.clone(), config.max_output_bytes))
        };
        let container = || {
            ContainerBackend::connect(config.container.clone(), config.max_output_bytes)
                .map(|backend| Arc::new(backend) as Arc<dyn SandboxBackend>)
        };

        let (primary, fallback) = match config.backend {
            BackendMode::Local => (Some(local()), None),
            BackendMode::Container => {
                let backend = container().map_err(|e| RunnerError::NoBackend(e.to_string()))?;
                (Some(backend), None)
            }
            BackendMode::Auto => {
                let primary = match container() {
                    Ok(backend) => Some(backend),
                    Err(e) => {
                        warn!(error = %e, "container backend unavailable");
                        None
                    }
                };
                let fallback = config.allow_local_fallback.then(local);
                if primary.is_none() && fallback.is_none() {
                    return Err(RunnerError::NoBackend(
                        "containers are unavailable and local fallback is disabled".to_owned(),
                    ));
                }
                (primary, fallback)
            }
        };

        let explainer = Explainer::from_settings(&config.explainer)?;
        Self::with_backends(config, primary, fallback, explainer)
    }

    /// Create a runner with explicit backends and explainer
    pub fn with_backends(
        config: Config,
        primary: Option<Arc<dyn SandboxBackend>>,
        fallback: Option<Arc<dyn SandboxBackend>>,
        explainer: Explainer,
    ) -> Result<Self, RunnerError> {
        let registry = LanguageRegistry::from_config(&config)?;
        let pool = WorkspacePool::new(
            config.workspace_root(),
            config.max_concurrent,
            config.queue_timeout(),
        );

        info!(
            languages = registry.len(),
            primary = primary.as_ref().map(|b| b.name()),
            fallback = fallback.as_ref().map(|b| b.name()),
            explainer = explainer.is_enabled(),
            max_concurrent = config.max_concurrent,
            "runner ready"
        );

        Ok(Self {
            inner: Arc::new(RunnerInner {
                config,
                registry,
                pool,
                primary,
                fallback,
                explainer,
            }),
        })
    }

    /// Create a new runner with default configuration
    pub fn with_defaults() -> Result<Self, RunnerError> {
        Self::new(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.inner.registry
    }

    /// Supported languages with their starter templates
    pub fn languages(&self) -> Vec<LanguageSummary> {
        self.inner.registry.list()
    }

    /// Starter code for a language
    pub fn template(&self, language: &str) -> Result<String, ValidationError> {
        self.inner.registry.template(language)
    }

    /// Number of executions that could start right now
    pub fn available_slots(&self) -> usize {
        self.inner.pool.available()
    }

    /// Check a request without running it
    pub fn validate(
        &self,
        request: &ExecutionRequest,
    ) -> Result<(LanguageId, Arc<LanguageProfile>), ValidationError> {
        if request.code.trim().is_empty() {
            return Err(ValidationError::EmptyCode);
        }
        let resolved = self.inner.registry.resolve(&request.language)?;

        let config = &self.inner.config;
        if request.code.len() > config.max_source_bytes {
            return Err(ValidationError::CodeTooLarge {
                size: request.code.len(),
                limit: config.max_source_bytes,
            });
        }
        if request.stdin.len() > config.max_stdin_bytes {
            return Err(ValidationError::StdinTooLarge {
                size: request.stdin.len(),
                limit: config.max_stdin_bytes,
            });
        }
        Ok(resolved)
    }

    /// Execute a request.
    ///
    /// Only invalid requests and a saturated runner produce an `Err`. Every
    /// outcome of actually running the code, including sandbox failures, is
    /// reported in the returned [`ExecutionResult`].
    #[instrument(skip_all, fields(language = %request.language, code_len = request.code.len()))]
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult, ExecuteError> {
        let (id, profile) = self.validate(&request)?;

        let workspace = match self.inner.pool.acquire().await {
            Ok(workspace) => workspace,
            Err(SandboxError::PoolExhausted) => {
                warn!("no free execution slot, rejecting request");
                return Err(ExecuteError::Busy);
            }
            Err(e) => {
                error!(error = %e, "failed to create workspace");
                return Ok(ExecutionResult::sandbox_error(
                    format!("Failed to prepare workspace: {e}"),
                    0.0,
                ));
            }
        };

        let inner = Arc::clone(&self.inner);
        let worker = tokio::spawn(async move { inner.run_pipeline(&profile, &request, workspace).await });

        let result = match worker.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "execution worker failed");
                ExecutionResult::sandbox_error("Internal error while running code", 0.0)
            }
        };

        info!(
            language = %id,
            success = result.success,
            status = ?result.status,
            execution_time = result.execution_time,
            "execution finished"
        );
        Ok(result)
    }
}

impl RunnerInner {
    async fn run_pipeline(
        &self,
        profile: &LanguageProfile,
        request: &ExecutionRequest,
        workspace: Workspace,
    ) -> ExecutionResult {
        let started = Instant::now();

        let (stage, mut result) = match self.run_with_fallback(profile, request, &workspace).await {
            Ok(finished) => finished,
            Err(e) => {
                error!(error = %e, "sandbox failure");
                let result = ExecutionResult::sandbox_error(
                    format!("Sandbox error: {e}"),
                    round_seconds(started.elapsed().as_secs_f64()),
                );
                (Stage::Run, result)
            }
        };

        if result.status.is_explainable() {
            let kind = match (result.status, stage) {
                (ExecutionStatus::Timeout, Stage::Compile) => FailureKind::CompileTimeout,
                (ExecutionStatus::Timeout, Stage::Run) => FailureKind::Timeout,
                _ => FailureKind::Error,
            };
            let explanation = self
                .explainer
                .explain(profile, &request.code, &result.error, &result.output, kind)
                .await;
            result.explanation = Some(explanation);
        }

        if let Err(e) = workspace.remove().await {
            debug!(error = %e, "workspace cleanup failed");
        }
        result
    }

    /// Run on the preferred backend, retrying on the fallback if the
    /// preferred one could not even start the code
    async fn run_with_fallback(
        &self,
        profile: &LanguageProfile,
        request: &ExecutionRequest,
        workspace: &Workspace,
    ) -> Result<(Stage, ExecutionResult), SandboxError> {
        workspace
            .write_file(&profile.source_name(), request.code.as_bytes())
            .await?;

        let Some(primary) = self.primary.as_deref().or(self.fallback.as_deref()) else {
            return Err(SandboxError::Unavailable(
                "no sandbox backend configured".to_owned(),
            ));
        };
        let fallback = self
            .fallback
            .as_deref()
            .filter(|fallback| !std::ptr::addr_eq(*fallback, primary));

        let attempt = match primary.prepare(profile).await {
            Ok(()) => run_phases(primary, profile, request, workspace).await,
            Err(e) => Err(e),
        };

        match (attempt, fallback) {
            (Err(e), Some(fallback)) if e.allows_fallback() => {
                warn!(
                    from = primary.name(),
                    to = fallback.name(),
                    error = %e,
                    "sandbox degraded, running with reduced isolation"
                );
                fallback.prepare(profile).await?;
                run_phases(fallback, profile, request, workspace).await
            }
            (attempt, _) => attempt,
        }
    }
}

/// Pipeline step that produced the final result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Compile,
    Run,
}

/// Compile (if needed) and run on one backend
async fn run_phases(
    backend: &dyn SandboxBackend,
    profile: &LanguageProfile,
    request: &ExecutionRequest,
    workspace: &Workspace,
) -> Result<(Stage, ExecutionResult), SandboxError> {
    let compile_time = match compile::compile(backend, profile, workspace).await? {
        Some(compiled) if !compiled.success => {
            let mut failure = compiled.into_failure(profile);
            failure.execution_time = round_seconds(failure.execution_time);
            return Ok((Stage::Compile, failure));
        }
        Some(compiled) => compiled.execution.wall_time,
        None => 0.0,
    };

    let outcome = execute::execute(backend, profile, workspace, request.stdin.as_bytes()).await?;
    let mut result = execute::normalize(profile, outcome);
    result.execution_time = round_seconds(compile_time + result.execution_time);
    Ok((Stage::Run, result))
}
