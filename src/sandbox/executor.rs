//! Sandbox executor: owns one session and drives its lifecycle.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{SandboxBackendKind, SandboxConfig};
use crate::error::TurnstileError;
use crate::util::text::capture_output;

use super::artifacts::{read_artifacts, DirSnapshot};
use super::backend::{PreparedProgram, SandboxBackend};
use super::language::Language;
use super::local::LocalProcessBackend;
use super::request::{ExecutionRequest, ExecutionResult, OUTPUT_LIMIT_BYTES, TIMEOUT_EXIT_CODE};
use super::session::{SandboxSession, SessionState};

/// Owns exactly one [`SandboxSession`] and the backend hosting it.
pub struct SandboxExecutor {
    session: SandboxSession,
    backend: Box<dyn SandboxBackend>,
    keep_work_dir: bool,
}

impl std::fmt::Debug for SandboxExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxExecutor")
            .field("session", &self.session)
            .field("backend", &self.backend.name())
            .finish()
    }
}

impl SandboxExecutor {
    /// Create an executor whose session will live in `working_dir`.
    pub fn new(
        backend: impl SandboxBackend + 'static,
        working_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            session: SandboxSession::new(working_dir.into(), timeout),
            backend: Box::new(backend),
            keep_work_dir: true,
        }
    }

    /// Build the executor described by configuration.
    pub fn from_config(config: &SandboxConfig) -> Result<Self, TurnstileError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let executor = match config.backend {
            SandboxBackendKind::Local => {
                Self::new(LocalProcessBackend::new(), config.work_dir.clone(), timeout)
            }
            #[cfg(feature = "docker")]
            SandboxBackendKind::Docker => Self::new(
                super::docker::DockerBackend::new(config.image.clone()),
                config.work_dir.clone(),
                timeout,
            ),
            #[cfg(not(feature = "docker"))]
            SandboxBackendKind::Docker => {
                return Err(TurnstileError::Configuration(
                    "docker sandbox requested but the `docker` feature is disabled".to_string(),
                ))
            }
        };
        Ok(executor.keep_work_dir(config.keep_work_dir))
    }

    /// Remove the working directory on `stop` when set to `false`.
    pub fn keep_work_dir(mut self, keep: bool) -> Self {
        self.keep_work_dir = keep;
        self
    }

    pub fn session(&self) -> &SandboxSession {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    fn transition(&mut self, next: SessionState) -> Result<(), TurnstileError> {
        let current = self.session.state();
        if !current.can_transition_to(next) {
            return Err(TurnstileError::InvalidState(format!(
                "sandbox session {} cannot move from {current} to {next}",
                self.session.id()
            )));
        }
        tracing::debug!(
            session_id = self.session.id(),
            backend = self.backend.name(),
            from = %current,
            to = %next,
            "sandbox state transition"
        );
        self.session.set_state(next);
        Ok(())
    }

    fn fail(&mut self) {
        if self.session.state().can_transition_to(SessionState::Failed) {
            self.session.set_state(SessionState::Failed);
        }
    }

    /// Create the isolated environment.
    ///
    /// Not idempotent: starting a running session is an error. A failed start
    /// leaves the session in `Failed`; call [`stop`](Self::stop) afterwards to
    /// release anything partially created.
    pub async fn start(&mut self) -> Result<(), TurnstileError> {
        self.transition(SessionState::Starting)?;

        if let Err(err) = tokio::fs::create_dir_all(self.session.working_dir()).await {
            self.fail();
            return Err(TurnstileError::Sandbox(format!(
                "failed to create working directory {}: {err}",
                self.session.working_dir().display()
            )));
        }

        match self.backend.start(&self.session).await {
            Ok(()) => {
                self.transition(SessionState::Running)?;
                tracing::info!(
                    session_id = self.session.id(),
                    backend = self.backend.name(),
                    working_dir = %self.session.working_dir().display(),
                    "sandbox session running"
                );
                Ok(())
            }
            Err(err) => {
                self.fail();
                tracing::error!(
                    session_id = self.session.id(),
                    backend = self.backend.name(),
                    error = %err,
                    "sandbox session failed to start"
                );
                Err(match err {
                    TurnstileError::Sandbox(_) => err,
                    other => TurnstileError::Sandbox(other.to_string()),
                })
            }
        }
    }

    /// Run code in the session.
    ///
    /// A deadline overrun is not an error: the result comes back with
    /// `timed_out` set and the session stays `Running`.
    pub async fn execute(
        &mut self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, TurnstileError> {
        if self.session.state() != SessionState::Running {
            return Err(TurnstileError::InvalidState(format!(
                "sandbox session {} is {}, not running",
                self.session.id(),
                self.session.state()
            )));
        }

        let Ok(language) = request.language.parse::<Language>() else {
            return Ok(ExecutionResult::rejected(
                1,
                format!("unknown language: {}", request.language),
            ));
        };

        let timeout = request.timeout_override.unwrap_or(self.session.timeout());
        let program = PreparedProgram {
            language,
            file_name: language.code_file_name(&request.code),
        };
        let work_dir = self.session.working_dir().to_path_buf();
        tokio::fs::write(work_dir.join(&program.file_name), &request.code).await?;

        let before = DirSnapshot::capture(&work_dir).await?;
        let raw = self.backend.run(&self.session, &program, timeout).await?;
        let after = DirSnapshot::capture(&work_dir).await?;
        let artifacts = read_artifacts(&work_dir, &after.changed_since(&before)).await;

        if raw.timed_out {
            tracing::warn!(
                session_id = self.session.id(),
                timeout_ms = timeout.as_millis() as u64,
                "execution timed out"
            );
        }

        Ok(ExecutionResult {
            stdout: capture_output(&raw.stdout, OUTPUT_LIMIT_BYTES),
            stderr: capture_output(&raw.stderr, OUTPUT_LIMIT_BYTES),
            exit_code: if raw.timed_out {
                TIMEOUT_EXIT_CODE
            } else {
                raw.exit_code.unwrap_or(-1)
            },
            artifacts,
            timed_out: raw.timed_out,
        })
    }

    /// Release the session.
    ///
    /// Safe to call in any state: a session that never started is simply
    /// marked stopped, and a failed session still gets its partial resources
    /// released. Teardown failures move the session to `Failed` and come back
    /// as [`TurnstileError::ResourceCleanup`].
    pub async fn stop(&mut self) -> Result<(), TurnstileError> {
        match self.session.state() {
            SessionState::Stopped => return Ok(()),
            SessionState::Uninitialized => return self.transition(SessionState::Stopped),
            SessionState::Failed => {
                return self.backend.stop(&self.session).await.map_err(cleanup_error);
            }
            SessionState::Starting | SessionState::Running | SessionState::Stopping => {}
        }

        if self.session.state() != SessionState::Stopping {
            self.transition(SessionState::Stopping)?;
        }
        if let Err(err) = self.backend.stop(&self.session).await {
            self.fail();
            return Err(cleanup_error(err));
        }
        if !self.keep_work_dir {
            if let Err(err) = tokio::fs::remove_dir_all(self.session.working_dir()).await {
                tracing::warn!(
                    session_id = self.session.id(),
                    error = %err,
                    "failed to remove sandbox working directory"
                );
            }
        }
        self.transition(SessionState::Stopped)?;
        tracing::info!(session_id = self.session.id(), "sandbox session stopped");
        Ok(())
    }
}

impl Drop for SandboxExecutor {
    fn drop(&mut self) {
        if matches!(
            self.session.state(),
            SessionState::Starting | SessionState::Running | SessionState::Stopping
        ) {
            self.backend.release_on_drop(&self.session);
        }
    }
}

fn cleanup_error(err: TurnstileError) -> TurnstileError {
    match err {
        TurnstileError::ResourceCleanup(_) => err,
        other => TurnstileError::ResourceCleanup(other.to_string()),
    }
}
