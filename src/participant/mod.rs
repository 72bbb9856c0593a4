//! Participants that take turns in a conversation.
//!
//! The set of participant variants is closed: a [`Participant`] is a
//! [`GenerativeAgent`], a [`CodeExecutorAgent`], or a [`HumanProxy`], and the
//! scheduler dispatches on the variant.

pub mod bindings;
pub mod executor;
pub mod generative;
pub mod human;

pub use bindings::ParticipantBindings;
pub use executor::CodeExecutorAgent;
pub use generative::{GenerativeAgent, Responder, ResponderRequest, Response, ToolDefinition};
pub use human::{ChannelInput, HumanProxy, InputSender, InputSource, StdinInput};

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio_util::sync::CancellationToken;

use crate::error::TurnstileError;
use crate::sandbox::SandboxExecutor;
use crate::types::{Message, Reply};

/// Stream of replies produced during one turn.
pub type ReplyStream<'a> = BoxStream<'a, Result<Reply, TurnstileError>>;

/// Participant variant tag, as used in configuration files.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParticipantKind {
    Generative,
    Executor,
    Human,
}

/// Everything a participant sees during its turn.
pub struct TurnContext<'a> {
    /// Conversation as it stood when the turn began.
    pub history: Vec<Message>,
    pub task: &'a str,
    /// The run's sandbox, lent for the duration of the turn.
    pub sandbox: Option<&'a mut SandboxExecutor>,
    pub cancel: CancellationToken,
}

impl<'a> TurnContext<'a> {
    pub fn new(history: Vec<Message>, task: &'a str) -> Self {
        Self {
            history,
            task,
            sandbox: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_sandbox(mut self, sandbox: &'a mut SandboxExecutor) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// A named conversational agent.
pub enum Participant {
    Generative(GenerativeAgent),
    Executor(CodeExecutorAgent),
    Human(HumanProxy),
}

impl Participant {
    pub fn name(&self) -> &str {
        match self {
            Self::Generative(agent) => agent.name(),
            Self::Executor(agent) => agent.name(),
            Self::Human(proxy) => proxy.name(),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Self::Generative(agent) => agent.description(),
            Self::Executor(agent) => agent.description(),
            Self::Human(proxy) => proxy.description(),
        }
    }

    pub fn kind(&self) -> ParticipantKind {
        match self {
            Self::Generative(_) => ParticipantKind::Generative,
            Self::Executor(_) => ParticipantKind::Executor,
            Self::Human(_) => ParticipantKind::Human,
        }
    }

    /// Whether this participant needs the run's sandbox.
    pub fn uses_sandbox(&self) -> bool {
        matches!(self, Self::Executor(_))
    }

    /// Produce this turn's replies.
    ///
    /// Replies are yielded one at a time as they become available; the
    /// scheduler appends each before polling for the next. An `Err` item
    /// ends the turn and the run.
    pub fn act<'a>(&'a self, ctx: TurnContext<'a>) -> ReplyStream<'a> {
        match self {
            Self::Generative(agent) => agent.act(ctx),
            Self::Executor(agent) => agent.act(ctx),
            Self::Human(proxy) => proxy.act(ctx),
        }
    }
}

impl std::fmt::Debug for Participant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Participant")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .finish()
    }
}

impl From<GenerativeAgent> for Participant {
    fn from(agent: GenerativeAgent) -> Self {
        Self::Generative(agent)
    }
}

impl From<CodeExecutorAgent> for Participant {
    fn from(agent: CodeExecutorAgent) -> Self {
        Self::Executor(agent)
    }
}

impl From<HumanProxy> for Participant {
    fn from(proxy: HumanProxy) -> Self {
        Self::Human(proxy)
    }
}
