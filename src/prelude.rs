//! Convenience re-exports for common use.

pub use crate::config::{ParticipantConfig, SandboxBackendKind, SandboxConfig, TurnstileConfig};
pub use crate::conversation::Conversation;
pub use crate::error::{Result, TurnstileError};
pub use crate::participant::{
    ChannelInput, CodeExecutorAgent, GenerativeAgent, HumanProxy, InputSender, Participant,
    ParticipantBindings, ParticipantKind, Responder, ResponderRequest, Response, StdinInput,
};
#[cfg(feature = "docker")]
pub use crate::sandbox::DockerBackend;
pub use crate::sandbox::{
    ExecutionRequest, ExecutionResult, LocalProcessBackend, SandboxBackend, SandboxExecutor,
    SessionState,
};
pub use crate::team::{fan_out, RoundRobinTeam, RunItem, RunStream, StopReason, TaskResult};
pub use crate::termination::TerminationCondition;
pub use crate::tools::{FnTool, Tool, ToolArguments, ToolParameters};
pub use crate::types::{Message, MessageKind, Reply, ToolCall, ToolOutcome};
pub use tokio_util::sync::CancellationToken;
