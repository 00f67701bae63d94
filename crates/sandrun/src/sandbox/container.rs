//! Docker container backend
//!
//! Every command runs in a fresh container created from the profile's image.
//! The workspace is bind mounted read-write, networking is disabled, memory
//! (with no extra swap) and process count are capped, and the container is
//! removed once the command finishes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, LogOutput, LogsOptions,
    RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use futures_util::stream::StreamExt;
use tracing::{debug, info, instrument, warn};

use crate::config::{ContainerSettings, LanguageProfile};
use crate::sandbox::capture::OutputBuffer;
use crate::sandbox::{Invocation, SandboxBackend, SandboxError};
use crate::types::RawExecutionOutcome;

/// File in the workspace that is redirected into the command's stdin
const STDIN_FILE: &str = ".stdin";

/// Exit status of a container killed by SIGKILL, usually the OOM killer
const EXIT_SIGKILL: i32 = 137;

/// Runs commands in ephemeral Docker containers
#[derive(Debug, Clone)]
pub struct ContainerBackend {
    docker: Docker,
    settings: ContainerSettings,
    max_output_bytes: usize,
}

impl ContainerBackend {
    /// Connect to the local Docker daemon.
    ///
    /// Fails only if the daemon socket is missing. Whether the daemon
    /// answers is checked by [`ping()`](Self::ping) and
    /// [`prepare()`](SandboxBackend::prepare).
    pub fn connect(settings: ContainerSettings, max_output_bytes: usize) -> Result<Self, SandboxError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| SandboxError::Unavailable(format!("failed to connect to Docker: {e}")))?;
        Ok(Self::with_client(docker, settings, max_output_bytes))
    }

    /// Use an already configured client
    pub fn with_client(docker: Docker, settings: ContainerSettings, max_output_bytes: usize) -> Self {
        Self {
            docker,
            settings,
            max_output_bytes,
        }
    }

    /// Check whether the daemon answers within the ping timeout
    pub async fn ping(&self) -> bool {
        match bounded(self.settings.ping_timeout(), "ping Docker", self.docker.ping()).await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "Docker ping failed");
                false
            }
        }
    }

    /// Make sure the image is present, pulling it if allowed
    async fn ensure_image(&self, image: &str) -> Result<(), SandboxError> {
        let limit = self.settings.ping_timeout();
        match tokio::time::timeout(limit, self.docker.inspect_image(image)).await {
            Ok(Ok(_)) => {
                debug!(image, "image present");
                return Ok(());
            }
            Ok(Err(e)) => debug!(image, error = %e, "image not present"),
            Err(_) => {
                return Err(SandboxError::Unavailable(format!(
                    "image lookup for '{image}' did not finish within {limit:?}"
                )));
            }
        }

        if !self.settings.pull_missing_images {
            return Err(SandboxError::Unavailable(format!(
                "image '{image}' is not present and pulling is disabled"
            )));
        }

        info!(image, "pulling image");
        let pull = async {
            let options = Some(CreateImageOptions {
                from_image: image,
                ..Default::default()
            });
            let mut stream = self.docker.create_image(options, None, None);
            while let Some(progress) = stream.next().await {
                if let Err(e) = progress {
                    return Err(e);
                }
            }
            Ok::<(), bollard::errors::Error>(())
        };
        bounded(self.settings.pull_timeout(), &format!("pull image '{image}'"), pull)
            .await
            .map_err(SandboxError::Unavailable)?;
        info!(image, "image pulled");
        Ok(())
    }

    fn container_config(&self, invocation: &Invocation<'_>) -> Config<String> {
        let mount = &self.settings.mount_path;
        let memory = i64::try_from(invocation.profile.memory_limit.bytes()).unwrap_or(i64::MAX);

        // Wrap the command so stdin comes from the workspace file
        let mut cmd = vec![
            "sh".to_owned(),
            "-c".to_owned(),
            format!("exec \"$@\" < {mount}/{STDIN_FILE}"),
            "sh".to_owned(),
        ];
        cmd.extend(invocation.command.iter().cloned());

        let mut env = vec![format!("HOME={mount}")];
        env.extend(invocation.env.iter().map(|(k, v)| format!("{k}={v}")));

        Config {
            image: Some(invocation.profile.image.clone()),
            cmd: Some(cmd),
            env: Some(env),
            working_dir: Some(mount.clone()),
            user: self.settings.run_as_host_user.then(host_user),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                binds: Some(vec![format!(
                    "{}:{mount}:rw",
                    invocation.workspace.path().display()
                )]),
                memory: Some(memory),
                memory_swap: Some(memory),
                pids_limit: Some(self.settings.pids_limit),
                nano_cpus: self.settings.cpus.map(|cpus| (cpus * 1_000_000_000.0) as i64),
                network_mode: Some("none".to_owned()),
                cap_drop: Some(vec!["ALL".to_owned()]),
                security_opt: Some(vec!["no-new-privileges".to_owned()]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// `uid:gid` of this process, so files the container writes stay removable
fn host_user() -> String {
    format!(
        "{}:{}",
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw()
    )
}

/// Await a daemon call for at most `limit`
async fn bounded<T>(
    limit: Duration,
    action: &str,
    call: impl Future<Output = Result<T, bollard::errors::Error>>,
) -> Result<T, String> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("failed to {action}: {e}")),
        Err(_) => Err(format!("{action} did not finish within {limit:?}")),
    }
}

/// Removes the container on drop unless it was already removed
struct ContainerGuard {
    docker: Docker,
    id: String,
    limit: Duration,
    armed: bool,
}

impl ContainerGuard {
    fn new(docker: Docker, id: String, limit: Duration) -> Self {
        Self {
            docker,
            id,
            limit,
            armed: true,
        }
    }

    async fn remove(mut self) {
        self.armed = false;
        remove_container(&self.docker, &self.id, self.limit).await;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let docker = self.docker.clone();
        let id = std::mem::take(&mut self.id);
        let limit = self.limit;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_container(&docker, &id, limit).await });
            }
            Err(_) => warn!(container = %id, "no runtime to remove container, leaking it"),
        }
    }
}

async fn remove_container(docker: &Docker, id: &str, limit: Duration) {
    let options = RemoveContainerOptions {
        force: true,
        ..Default::default()
    };
    match bounded(limit, "remove container", docker.remove_container(id, Some(options))).await {
        Ok(()) => debug!(container = %id, "container removed"),
        Err(e) => warn!(container = %id, error = %e, "container left behind"),
    }
}

/// Exit code from the wait stream; bollard reports non-zero exits as errors
async fn wait_exit_code(docker: &Docker, id: &str) -> Option<i32> {
    let options = WaitContainerOptions {
        condition: "not-running",
    };
    let mut stream = docker.wait_container(id, Some(options));
    match stream.next().await {
        Some(Ok(response)) => i32::try_from(response.status_code).ok(),
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
            i32::try_from(code).ok()
        }
        Some(Err(e)) => {
            warn!(container = %id, error = %e, "failed to wait for container");
            None
        }
        None => None,
    }
}

#[async_trait]
impl SandboxBackend for ContainerBackend {
    fn name(&self) -> &'static str {
        "container"
    }

    #[instrument(skip_all, fields(image = %profile.image))]
    async fn prepare(&self, profile: &LanguageProfile) -> Result<(), SandboxError> {
        if !self.ping().await {
            return Err(SandboxError::Unavailable(
                "Docker daemon is not reachable".to_owned(),
            ));
        }
        self.ensure_image(&profile.image).await
    }

    #[instrument(skip_all, fields(language = %invocation.profile.name, command = ?invocation.command))]
    async fn run(&self, invocation: Invocation<'_>) -> Result<RawExecutionOutcome, SandboxError> {
        if invocation.command.is_empty() {
            return Err(SandboxError::EmptyCommand);
        }
        invocation
            .workspace
            .write_file(STDIN_FILE, invocation.stdin)
            .await?;

        let name = format!("sandrun-{}", uuid::Uuid::new_v4());
        let config = self.container_config(&invocation);
        let create_options = CreateContainerOptions {
            name: name.as_str(),
            platform: None,
        };

        let api_timeout = self.settings.api_timeout();
        let container = bounded(
            api_timeout,
            "create container",
            self.docker.create_container(Some(create_options), config),
        )
        .await
        .map_err(SandboxError::Setup)?;
        let guard = ContainerGuard::new(self.docker.clone(), container.id.clone(), api_timeout);
        debug!(container = %name, "container created");

        let start = Instant::now();
        bounded(
            api_timeout,
            "start container",
            self.docker
                .start_container(&container.id, None::<StartContainerOptions<String>>),
        )
        .await
        .map_err(SandboxError::Setup)?;

        let mut stdout = OutputBuffer::new(self.max_output_bytes);
        let mut stderr = OutputBuffer::new(self.max_output_bytes);

        let execution = async {
            let options = Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                follow: true,
                ..Default::default()
            });
            let mut logs = self.docker.logs(&container.id, options);
            while let Some(chunk) = logs.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => stdout.push(&message),
                    Ok(LogOutput::StdErr { message }) => stderr.push(&message),
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "error reading container logs");
                        break;
                    }
                }
            }
            wait_exit_code(&self.docker, &container.id).await
        };

        let finished = tokio::time::timeout(invocation.deadline, execution).await;
        let (exit_code, timed_out) = match finished {
            Ok(code) => (code, false),
            Err(_) => {
                debug!(deadline = ?invocation.deadline, "deadline reached, killing container");
                let kill = self
                    .docker
                    .kill_container(&container.id, None::<KillContainerOptions<String>>);
                if let Err(e) = bounded(api_timeout, "kill container", kill).await {
                    warn!(error = %e, "timed-out container may still be running");
                }
                (None, true)
            }
        };
        let wall_time = start.elapsed().as_secs_f64();

        guard.remove().await;

        if exit_code == Some(EXIT_SIGKILL) {
            stderr.push(b"\n[Container killed: likely exceeded memory limit]");
        }

        debug!(?exit_code, timed_out, wall_time, "container finished");

        Ok(RawExecutionOutcome {
            exit_code,
            stdout: stdout.into_string(),
            stderr: stderr.into_string(),
            wall_time,
            timed_out,
        })
    }
}
