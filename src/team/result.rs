//! Run outcome types.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::types::{Message, MessageKind};

/// Source name used for messages the scheduler itself produces.
pub const SCHEDULER_SOURCE: &str = "turnstile";

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A termination condition matched; holds the condition's reason.
    /// Rendered as `termination:<reason>`.
    Termination(String),
    /// The scheduler's turn limit was reached.
    MaxTurns,
    ParticipantError,
    SandboxError,
    Cancelled,
}

impl StopReason {
    pub(crate) fn from_termination(reason: String) -> Self {
        if reason == "max_turns" {
            Self::MaxTurns
        } else {
            Self::Termination(reason)
        }
    }

}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Termination(reason) => write!(f, "termination:{reason}"),
            Self::MaxTurns => f.write_str("max_turns"),
            Self::ParticipantError => f.write_str("participant_error"),
            Self::SandboxError => f.write_str("sandbox_error"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub messages: Vec<Message>,
    pub stop_reason: StopReason,
}

impl TaskResult {
    /// Closing message for renderers. Not part of the conversation.
    pub fn summary(&self) -> Message {
        Message {
            source: SCHEDULER_SOURCE.to_string(),
            kind: MessageKind::RunSummary,
            content: format!("Stop reason: {}", self.stop_reason),
            sequence: self.messages.last().map_or(1, |m| m.sequence + 1),
            timestamp: Utc::now(),
        }
    }

    /// Messages produced by the named participant.
    pub fn messages_from<'a>(&'a self, source: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.messages.iter().filter(move |m| m.source == source)
    }
}

/// One item of a run's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum RunItem {
    /// A message, yielded right after it was appended.
    Message(Message),
    /// Always the last item.
    Finished(TaskResult),
}

impl RunItem {
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Self::Message(message) => Some(message),
            Self::Finished(_) => None,
        }
    }
}
