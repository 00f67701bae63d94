//! Execution step for code running
//!
//! Runs the interpreter or compiled artifact with the request's stdin and
//! turns the raw outcome into an [`ExecutionResult`].

use tracing::{debug, instrument};

use crate::config::LanguageProfile;
use crate::sandbox::{Invocation, SandboxBackend, SandboxError, Workspace};
use crate::types::{ExecutionResult, ExecutionStatus, RawExecutionOutcome};

/// Run the program in the workspace
#[instrument(skip_all, fields(language = %profile.name, backend = backend.name()))]
pub async fn execute(
    backend: &dyn SandboxBackend,
    profile: &LanguageProfile,
    workspace: &Workspace,
    stdin: &[u8],
) -> Result<RawExecutionOutcome, SandboxError> {
    let command = profile.run_command();
    debug!(?command, stdin_len = stdin.len(), "executing program");

    backend
        .run(Invocation {
            profile,
            workspace,
            command: &command,
            env: &profile.run.env,
            stdin,
            deadline: profile.timeout(),
        })
        .await
}

/// Normalize the run phase outcome.
///
/// `execution_time` is filled in by the caller, which knows about the
/// compile phase too.
pub(crate) fn normalize(profile: &LanguageProfile, outcome: RawExecutionOutcome) -> ExecutionResult {
    let (success, status, error) = if outcome.timed_out {
        (
            false,
            ExecutionStatus::Timeout,
            format!("Execution timed out (limit: {}s)", profile.timeout_seconds),
        )
    } else if outcome.exit_code == Some(0) {
        (true, ExecutionStatus::Ok, String::new())
    } else if outcome.stderr.trim().is_empty() {
        let error = match outcome.exit_code {
            Some(code) => format!("Process exited with code {code}"),
            None => "Process exited abnormally".to_owned(),
        };
        (false, ExecutionStatus::RuntimeError, error)
    } else {
        (false, ExecutionStatus::RuntimeError, outcome.stderr)
    };

    ExecutionResult {
        success,
        output: outcome.stdout,
        error,
        execution_time: outcome.wall_time,
        status,
        explanation: None,
    }
}
