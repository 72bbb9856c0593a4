//! Sandbox session identity and lifecycle state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::Display;

/// Lifecycle state of a sandbox session.
///
/// Transitions move forward along
/// `Uninitialized → Starting → Running → Stopping → Stopped`; `Failed` is
/// absorbing and reachable from any state that has not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl SessionState {
    /// Whether the session has reached a state it cannot leave on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Uninitialized | Stopped, Starting) => true,
            (Starting, Running) => true,
            (Starting | Running, Stopping) => true,
            (Stopping, Stopped) => true,
            // Stopping a session that never started.
            (Uninitialized, Stopped) => true,
            (Uninitialized | Starting | Running | Stopping, Failed) => true,
            _ => false,
        }
    }
}

/// One isolated execution environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSession {
    id: String,
    working_dir: PathBuf,
    timeout: Duration,
    state: SessionState,
}

impl SandboxSession {
    pub(crate) fn new(working_dir: PathBuf, timeout: Duration) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: id[..12].to_string(),
            working_dir,
            timeout,
            state: SessionState::Uninitialized,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Default wall-clock limit for one execution.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }
}
