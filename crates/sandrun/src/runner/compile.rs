//! Compilation step for code execution
//!
//! Runs the profile's compiler inside the workspace. A failed compilation is
//! an ordinary outcome, not an error: it ends the pipeline with the
//! compiler's diagnostics.

use tracing::{debug, instrument};

use crate::config::LanguageProfile;
use crate::sandbox::{Invocation, SandboxBackend, SandboxError, Workspace};
use crate::types::{ExecutionResult, ExecutionStatus, RawExecutionOutcome};

/// Result of a compilation
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// Whether compilation succeeded
    pub success: bool,

    /// Raw outcome of the compiler process
    pub execution: RawExecutionOutcome,

    /// Compiler diagnostics (stdout and stderr combined)
    pub output: String,
}

impl CompileResult {
    /// Turn a failed compilation into the final result
    pub fn into_failure(self, profile: &LanguageProfile) -> ExecutionResult {
        let (status, error) = if self.execution.timed_out {
            (
                ExecutionStatus::Timeout,
                format!(
                    "Compilation timed out (limit: {}s)",
                    profile.compile_timeout().as_secs()
                ),
            )
        } else if self.output.trim().is_empty() {
            let code = self
                .execution
                .exit_code
                .map_or_else(|| "unknown".to_owned(), |code| code.to_string());
            (
                ExecutionStatus::CompileError,
                format!("Compilation failed with exit code {code}"),
            )
        } else {
            (ExecutionStatus::CompileError, self.output)
        };

        ExecutionResult {
            success: false,
            output: String::new(),
            error,
            execution_time: self.execution.wall_time,
            status,
            explanation: None,
        }
    }
}

/// Compile the workspace source, if the profile is compiled.
///
/// Returns `Ok(None)` for interpreted languages.
#[instrument(skip_all, fields(language = %profile.name, backend = backend.name()))]
pub async fn compile(
    backend: &dyn SandboxBackend,
    profile: &LanguageProfile,
    workspace: &Workspace,
) -> Result<Option<CompileResult>, SandboxError> {
    let (Some(compile_config), Some(command)) = (profile.compile.as_ref(), profile.compile_command())
    else {
        return Ok(None);
    };

    debug!(?command, "compiling");

    let execution = backend
        .run(Invocation {
            profile,
            workspace,
            command: &command,
            env: &compile_config.env,
            stdin: b"",
            deadline: profile.compile_timeout(),
        })
        .await?;

    // Compilers split diagnostics between the two streams
    let output = match (execution.stdout.trim().is_empty(), execution.stderr.trim().is_empty()) {
        (true, _) => execution.stderr.clone(),
        (false, true) => execution.stdout.clone(),
        (false, false) => format!("{}\n{}", execution.stdout.trim_end(), execution.stderr),
    };
    let success = execution.is_success();

    debug!(
        success,
        exit_code = ?execution.exit_code,
        timed_out = execution.timed_out,
        wall_time = execution.wall_time,
        "compilation complete"
    );

    Ok(Some(CompileResult {
        success,
        execution,
        output,
    }))
}
