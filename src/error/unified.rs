//! Error classification and recovery hints.

use serde::{Deserialize, Serialize};
use strum::Display;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Configuration,
    Sandbox,
    Participant,
    Timeout,
    Cleanup,
    ToolExecution,
    Cancelled,
    Serialization,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoverySuggestion {
    CheckConfiguration,
    CheckSandboxRuntime,
    IncreaseTimeout,
    CheckToolImplementation,
    RemoveLeakedResources,
    InspectConversation,
}

impl RecoverySuggestion {
    /// One-line hint for terminal output.
    pub fn hint(self) -> &'static str {
        match self {
            Self::CheckConfiguration => "check the config file and TURNSTILE_* environment variables",
            Self::CheckSandboxRuntime => "check that the sandbox runtime (docker) is installed and running",
            Self::IncreaseTimeout => "raise the sandbox timeout",
            Self::CheckToolImplementation => "check the failing tool's arguments and implementation",
            Self::RemoveLeakedResources => "remove leftover turnstile-* containers with `docker rm -f`",
            Self::InspectConversation => "inspect the conversation for the failing participant",
        }
    }
}
