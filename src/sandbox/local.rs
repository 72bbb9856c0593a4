//! Host-process backend: one working directory, one child process per execution.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::backend::{PreparedProgram, RawOutput, SandboxBackend};
use super::process::{run_with_deadline, ProcessGroups};
use super::session::SandboxSession;
use crate::error::TurnstileError;

/// Runs code as child processes of the host with a scrubbed environment.
///
/// Isolation is limited to the working directory and environment; use the
/// docker backend for untrusted code.
#[derive(Debug, Clone, Default)]
pub struct LocalProcessBackend {
    extra_env: Vec<(String, String)>,
    groups: ProcessGroups,
}

impl LocalProcessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass an additional environment variable to every execution.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_env.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl SandboxBackend for LocalProcessBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn start(&self, session: &SandboxSession) -> Result<(), TurnstileError> {
        let metadata = tokio::fs::metadata(session.working_dir()).await.map_err(|e| {
            TurnstileError::Sandbox(format!(
                "working directory {} unavailable: {e}",
                session.working_dir().display()
            ))
        })?;
        if !metadata.is_dir() {
            return Err(TurnstileError::Sandbox(format!(
                "{} is not a directory",
                session.working_dir().display()
            )));
        }
        Ok(())
    }

    async fn run(
        &self,
        session: &SandboxSession,
        program: &PreparedProgram,
        timeout: Duration,
    ) -> Result<RawOutput, TurnstileError> {
        let mut cmd = Command::new(program.language.interpreter());
        cmd.arg(&program.file_name)
            .current_dir(session.working_dir())
            .env_clear()
            .env("HOME", session.working_dir());
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }
        for (key, value) in &self.extra_env {
            cmd.env(key, value);
        }
        run_with_deadline(cmd, timeout, &self.groups).await
    }

    async fn stop(&self, session: &SandboxSession) -> Result<(), TurnstileError> {
        let killed = self.groups.kill_all();
        if killed > 0 {
            tracing::warn!(
                session_id = session.id(),
                killed,
                "killed process groups still running at teardown"
            );
        }
        Ok(())
    }
}
