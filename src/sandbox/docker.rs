//! Docker backend driving the `docker` CLI.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;

use super::backend::{PreparedProgram, RawOutput, SandboxBackend};
use super::process::{run_with_deadline, ProcessGroups};
use super::request::TIMEOUT_EXIT_CODE;
use super::session::SandboxSession;
use crate::error::TurnstileError;

const CONTAINER_WORKDIR: &str = "/workspace";
const DOCKER_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);
/// Extra time the client waits beyond the in-container `timeout`.
const CLIENT_GRACE: Duration = Duration::from_secs(2);
/// `timeout -s KILL` takes itself down with the process group.
const KILLED_EXIT_CODE: i32 = 128 + 9;

/// Runs each session in a long-lived container with the working directory
/// bind-mounted at `/workspace`.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    image: String,
    docker_bin: PathBuf,
    groups: ProcessGroups,
}

impl DockerBackend {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            docker_bin: PathBuf::from("docker"),
            groups: ProcessGroups::default(),
        }
    }

    /// Use a specific docker-compatible binary (e.g. `podman`).
    pub fn with_binary(mut self, docker_bin: impl Into<PathBuf>) -> Self {
        self.docker_bin = docker_bin.into();
        self
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn container_name(session: &SandboxSession) -> String {
        format!("turnstile-{}", session.id())
    }

    fn command(&self) -> Command {
        Command::new(&self.docker_bin)
    }

    async fn docker(&self, args: &[String]) -> Result<RawOutput, TurnstileError> {
        let mut cmd = self.command();
        cmd.args(args);
        let output = run_with_deadline(cmd, DOCKER_COMMAND_TIMEOUT, &self.groups).await?;
        if output.timed_out {
            return Err(TurnstileError::Sandbox(format!(
                "docker {} did not finish within {}s",
                args.first().map(String::as_str).unwrap_or_default(),
                DOCKER_COMMAND_TIMEOUT.as_secs()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl SandboxBackend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    async fn start(&self, session: &SandboxSession) -> Result<(), TurnstileError> {
        let host_dir = tokio::fs::canonicalize(session.working_dir()).await?;
        let args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            Self::container_name(session),
            "-v".to_string(),
            format!("{}:{CONTAINER_WORKDIR}", host_dir.display()),
            "-w".to_string(),
            CONTAINER_WORKDIR.to_string(),
            self.image.clone(),
            "sleep".to_string(),
            "infinity".to_string(),
        ];
        let output = self.docker(&args).await?;
        if output.exit_code != Some(0) {
            return Err(TurnstileError::Sandbox(format!(
                "failed to start container from {}: {}",
                self.image,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        tracing::info!(
            session_id = session.id(),
            image = %self.image,
            "docker container started"
        );
        Ok(())
    }

    async fn run(
        &self,
        session: &SandboxSession,
        program: &PreparedProgram,
        timeout: Duration,
    ) -> Result<RawOutput, TurnstileError> {
        let secs = container_timeout_secs(timeout);
        let mut cmd = self.command();
        cmd.args(["exec", "-w", CONTAINER_WORKDIR])
            .arg(Self::container_name(session))
            .args(["timeout", "-s", "KILL"])
            .arg(secs.to_string())
            .arg(program.language.interpreter())
            .arg(&program.file_name);
        let started = Instant::now();
        let mut output = run_with_deadline(cmd, timeout + CLIENT_GRACE, &self.groups).await?;
        let deadline_hit = started.elapsed() >= timeout;
        if deadline_hit
            && matches!(output.exit_code, Some(TIMEOUT_EXIT_CODE | KILLED_EXIT_CODE))
        {
            output.timed_out = true;
        }
        Ok(output)
    }

    async fn stop(&self, session: &SandboxSession) -> Result<(), TurnstileError> {
        let args = vec!["rm".to_string(), "-f".to_string(), Self::container_name(session)];
        let output = self.docker(&args).await?;
        if output.exit_code != Some(0) {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // A start that never created the container leaves nothing to remove.
            if stderr.contains("No such container") {
                return Ok(());
            }
            return Err(TurnstileError::ResourceCleanup(format!(
                "failed to remove container {}: {}",
                Self::container_name(session),
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn release_on_drop(&self, session: &SandboxSession) {
        let name = Self::container_name(session);
        tracing::warn!(container = %name, "sandbox dropped while live; removing container");
        if let Err(err) = std::process::Command::new(&self.docker_bin)
            .args(["rm", "-f", &name])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            tracing::warn!(container = %name, error = %err, "failed to spawn docker rm");
        }
    }
}

/// Whole seconds for coreutils `timeout`, rounded up so the container never
/// kills earlier than asked.
fn container_timeout_secs(timeout: Duration) -> u64 {
    (timeout.as_secs_f64().ceil() as u64).max(1)
}
