//! Message types exchanged between participants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Kind of content a message carries.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MessageKind {
    Text,
    ToolCall,
    ToolResult,
    Error,
    RunSummary,
}

/// A message appended to a conversation.
///
/// `sequence` is assigned by [`Conversation::append`](crate::conversation::Conversation::append)
/// and is strictly increasing within a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub source: String,
    pub kind: MessageKind,
    pub content: String,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn is_error(&self) -> bool {
        self.kind == MessageKind::Error
    }
}

/// Content produced by a participant before the scheduler stamps it with a
/// source and sequence number.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reply {
    pub kind: MessageKind,
    pub content: String,
}

impl Reply {
    /// Create a plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: content.into(),
        }
    }

    /// Create an error reply.
    pub fn error(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            content: content.into(),
        }
    }

    /// Create a tool result reply from free-form text.
    pub fn tool_output(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::ToolResult,
            content: content.into(),
        }
    }

    /// Create a reply announcing a tool call.
    pub fn tool_call(call: &ToolCall) -> Self {
        Self {
            kind: MessageKind::ToolCall,
            content: serde_json::json!({
                "id": call.id,
                "name": call.name,
                "arguments": call.arguments,
            })
            .to_string(),
        }
    }

    /// Create a reply carrying a tool's outcome.
    pub fn tool_result(outcome: &ToolOutcome) -> Self {
        Self {
            kind: MessageKind::ToolResult,
            content: serde_json::json!({
                "tool_call_id": outcome.tool_call_id,
                "result": outcome.result,
                "is_error": outcome.is_error,
            })
            .to_string(),
        }
    }
}

/// A tool call requested by a responder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// A tool execution result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolOutcome {
    pub tool_call_id: String,
    pub result: serde_json::Value,
    #[serde(default)]
    pub is_error: bool,
}
