//! Isolation backends that host a sandbox session.

use std::time::Duration;

use async_trait::async_trait;

use super::language::Language;
use super::session::SandboxSession;
use crate::error::TurnstileError;

/// A code file already written into the session's working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedProgram {
    pub language: Language,
    /// File name relative to the working directory.
    pub file_name: String,
}

/// Raw process output before truncation and artifact collection.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

/// Environment that creates, runs code in, and tears down a session.
///
/// The [`SandboxExecutor`](super::SandboxExecutor) owns the state machine;
/// backends only perform the side effects.
#[async_trait]
pub trait SandboxBackend: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Create the isolated environment. The working directory already exists.
    async fn start(&self, session: &SandboxSession) -> Result<(), TurnstileError>;

    /// Run a prepared program, killing it once `timeout` elapses.
    async fn run(
        &self,
        session: &SandboxSession,
        program: &PreparedProgram,
        timeout: Duration,
    ) -> Result<RawOutput, TurnstileError>;

    /// Release everything `start` acquired. Also called after a failed start.
    async fn stop(&self, session: &SandboxSession) -> Result<(), TurnstileError>;

    /// Best-effort synchronous release when an executor is dropped while live.
    fn release_on_drop(&self, _session: &SandboxSession) {}
}
