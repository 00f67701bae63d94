//! Host process backend
//!
//! Runs commands directly on the host in the workspace directory. The child
//! gets a cleared environment and its own process group so the watchdog can
//! kill everything it spawned. There is no network or filesystem isolation,
//! and memory limiting is limited to an optional `RLIMIT_AS`.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::config::{LanguageProfile, LocalSettings};
use crate::sandbox::capture::{OutputBuffer, read_capped};
use crate::sandbox::{Invocation, SandboxBackend, SandboxError, Workspace};
use crate::types::RawExecutionOutcome;

/// How long to keep draining pipes after the child is gone
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs commands as local processes
#[derive(Debug, Clone)]
pub struct LocalBackend {
    settings: LocalSettings,
    max_output_bytes: usize,
}

impl LocalBackend {
    pub fn new(settings: LocalSettings, max_output_bytes: usize) -> Self {
        Self {
            settings,
            max_output_bytes,
        }
    }

    fn build_command(&self, invocation: &Invocation<'_>) -> Result<Command, SandboxError> {
        let (program, args) = invocation
            .command
            .split_first()
            .ok_or(SandboxError::EmptyCommand)?;
        let workspace = invocation.workspace.path();

        let mut cmd = Command::new(resolve_program(program, invocation.workspace));
        cmd.args(args)
            .current_dir(workspace)
            .env_clear()
            .env("PATH", &self.settings.path)
            .env("HOME", workspace)
            .env("LANG", "C.UTF-8")
            .envs(invocation.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);

        if self.settings.enforce_address_space_limit {
            let limit = invocation.profile.memory_limit.bytes();
            // SAFETY: setrlimit is async-signal-safe and touches no shared state.
            unsafe {
                cmd.pre_exec(move || {
                    use nix::sys::resource::{Resource, setrlimit};
                    setrlimit(Resource::RLIMIT_AS, limit, limit).map_err(std::io::Error::from)
                });
            }
        }

        Ok(cmd)
    }
}

/// Commands written as `./name` refer to artifacts in the workspace
fn resolve_program(program: &str, workspace: &Workspace) -> PathBuf {
    match program.strip_prefix("./") {
        Some(artifact) => workspace.path().join(artifact),
        None => PathBuf::from(program),
    }
}

/// Kill the whole process group led by `pid`
fn kill_process_group(pid: Option<u32>) {
    let Some(pid) = pid.and_then(|pid| i32::try_from(pid).ok()) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        debug!(pid, error = %e, "killpg failed (group already gone?)");
    }
}

async fn join_capture(
    handle: Option<JoinHandle<std::io::Result<OutputBuffer>>>,
    limit: usize,
) -> OutputBuffer {
    let Some(mut handle) = handle else {
        return OutputBuffer::new(limit);
    };
    match tokio::time::timeout(DRAIN_GRACE, &mut handle).await {
        Ok(Ok(Ok(buffer))) => buffer,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "failed to read child output");
            OutputBuffer::new(limit)
        }
        Ok(Err(e)) => {
            warn!(error = %e, "output reader task failed");
            OutputBuffer::new(limit)
        }
        Err(_) => {
            // A descendant left the process group and still holds the pipe
            handle.abort();
            warn!("output pipe still open after child exit, giving up on it");
            OutputBuffer::new(limit)
        }
    }
}

fn exit_code(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
}

#[async_trait]
impl SandboxBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn prepare(&self, _profile: &LanguageProfile) -> Result<(), SandboxError> {
        Ok(())
    }

    #[instrument(skip_all, fields(language = %invocation.profile.name, command = ?invocation.command))]
    async fn run(&self, invocation: Invocation<'_>) -> Result<RawExecutionOutcome, SandboxError> {
        let mut cmd = self.build_command(&invocation)?;

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| SandboxError::Spawn {
            program: invocation.command[0].clone(),
            source,
        })?;
        let pid = child.id();
        debug!(?pid, "spawned local process");

        let stdin_task = child.stdin.take().map(|mut pipe| {
            let data = invocation.stdin.to_vec();
            tokio::spawn(async move {
                // The child may exit without reading its input
                if let Err(e) = pipe.write_all(&data).await {
                    debug!(error = %e, "stdin write interrupted");
                }
            })
        });
        let limit = self.max_output_bytes;
        let stdout_task = child
            .stdout
            .take()
            .map(|pipe| tokio::spawn(read_capped(pipe, limit)));
        let stderr_task = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_capped(pipe, limit)));

        let waited = tokio::time::timeout(invocation.deadline, child.wait()).await;
        let (exit_code, timed_out) = match waited {
            Ok(status) => {
                let status = status?;
                // Reap anything the program left behind in its group
                kill_process_group(pid);
                (exit_code(status), false)
            }
            Err(_) => {
                debug!(deadline = ?invocation.deadline, "deadline reached, killing process group");
                kill_process_group(pid);
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "child already exited");
                }
                (None, true)
            }
        };
        let wall_time = start.elapsed().as_secs_f64();

        if let Some(task) = stdin_task {
            task.abort();
        }
        let stdout = join_capture(stdout_task, limit).await;
        let stderr = join_capture(stderr_task, limit).await;

        debug!(?exit_code, timed_out, wall_time, "local process finished");

        Ok(RawExecutionOutcome {
            exit_code,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            wall_time,
            timed_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::Config;

    fn backend() -> LocalBackend {
        LocalBackend::new(LocalSettings::default(), 1024)
    }

    fn bash_profile() -> LanguageProfile {
        Config::default().languages["bash"].clone()
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_owned(), "-c".to_owned(), script.to_owned()]
    }

    async fn run(
        backend: &LocalBackend,
        workspace: &Workspace,
        command: &[String],
        stdin: &[u8],
        deadline: Duration,
    ) -> RawExecutionOutcome {
        let profile = bash_profile();
        let env = HashMap::new();
        backend
            .run(Invocation {
                profile: &profile,
                workspace,
                command,
                env: &env,
                stdin,
                deadline,
            })
            .await
            .unwrap()
    }

    #[test]
    fn resolve_program_relative_to_workspace() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        assert_eq!(
            resolve_program("./program", &workspace),
            workspace.path().join("program")
        );
        assert_eq!(resolve_program("python3", &workspace), PathBuf::from("python3"));
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let outcome = run(
            &backend(),
            &workspace,
            &sh("echo out; echo err >&2; exit 3"),
            b"",
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(outcome.stdout, "out\n");
        assert_eq!(outcome.stderr, "err\n");
        assert_eq!(outcome.exit_code, Some(3));
        assert!(!outcome.timed_out);
        assert!(!outcome.is_success());
    }

    #[tokio::test]
    async fn pipes_stdin() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let outcome = run(
            &backend(),
            &workspace,
            &["cat".to_owned()],
            b"from stdin\n",
            Duration::from_secs(5),
        )
        .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.stdout, "from stdin\n");
    }

    #[tokio::test]
    async fn runs_in_workspace_with_clean_env() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        // SAFETY: tests in this module do not read this variable concurrently.
        unsafe { std::env::set_var("SANDRUN_TEST_SECRET", "leak") };

        let outcome = run(
            &backend(),
            &workspace,
            &sh("pwd; echo \"[$SANDRUN_TEST_SECRET]\"; echo \"$HOME\""),
            b"",
            Duration::from_secs(5),
        )
        .await;

        let lines: Vec<&str> = outcome.stdout.lines().collect();
        let workspace_path = workspace.path().canonicalize().unwrap();
        assert_eq!(PathBuf::from(lines[0]).canonicalize().unwrap(), workspace_path);
        assert_eq!(lines[1], "[]");
        assert_eq!(PathBuf::from(lines[2]), workspace.path());
    }

    #[tokio::test]
    async fn deadline_kills_process_group() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let start = Instant::now();
        let outcome = run(
            &backend(),
            &workspace,
            &sh("sleep 30 & sleep 30; wait"),
            b"",
            Duration::from_millis(300),
        )
        .await;

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn output_is_capped() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let outcome = run(
            &backend(),
            &workspace,
            &sh("head -c 100000 /dev/zero | tr '\\0' 'a'"),
            b"",
            Duration::from_secs(5),
        )
        .await;

        assert!(outcome.is_success());
        assert!(outcome.stdout.ends_with(crate::sandbox::TRUNCATION_MARKER));
        assert!(outcome.stdout.len() <= 1024 + crate::sandbox::TRUNCATION_MARKER.len());
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let profile = bash_profile();
        let env = HashMap::new();
        let command = vec!["definitely-not-a-real-binary".to_owned()];
        let result = backend()
            .run(Invocation {
                profile: &profile,
                workspace: &workspace,
                command: &command,
                env: &env,
                stdin: b"",
                deadline: Duration::from_secs(1),
            })
            .await;

        match result {
            Err(SandboxError::Spawn { program, .. }) => {
                assert_eq!(program, "definitely-not-a-real-binary")
            }
            other => panic!("expected Spawn error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_command_rejected() {
        let root = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(root.path()).unwrap();
        let profile = bash_profile();
        let env = HashMap::new();
        let result = backend()
            .run(Invocation {
                profile: &profile,
                workspace: &workspace,
                command: &[],
                env: &env,
                stdin: b"",
                deadline: Duration::from_secs(1),
            })
            .await;
        assert!(matches!(result, Err(SandboxError::EmptyCommand)));
    }
}
