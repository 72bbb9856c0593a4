//! Error types for Turnstile.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

/// Primary error type for all Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Sandbox error: {0}")]
    Sandbox(String),

    #[error("Participant error: {participant}: {message}")]
    Participant { participant: String, message: String },

    #[error("Execution timed out after {seconds}s")]
    ExecutionTimeout { seconds: u64 },

    #[error("Resource cleanup error: {0}")]
    ResourceCleanup(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl TurnstileError {
    /// Create a participant error.
    pub fn participant(participant: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Participant {
            participant: participant.into(),
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) | Self::ConfigParse(_) => ErrorCategory::Configuration,
            Self::Sandbox(_) => ErrorCategory::Sandbox,
            Self::Participant { .. } => ErrorCategory::Participant,
            Self::ExecutionTimeout { .. } => ErrorCategory::Timeout,
            Self::ResourceCleanup(_) => ErrorCategory::Cleanup,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Cancelled => ErrorCategory::Cancelled,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::Io(_) | Self::InvalidState(_) | Self::InvalidArgument(_) => {
                ErrorCategory::Unknown
            }
        }
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        match self.category() {
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Sandbox => RecoverySuggestion::CheckSandboxRuntime,
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::ToolExecution => RecoverySuggestion::CheckToolImplementation,
            ErrorCategory::Cleanup => RecoverySuggestion::RemoveLeakedResources,
            _ => RecoverySuggestion::InspectConversation,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TurnstileError>;
