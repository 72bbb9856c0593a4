//! Responder-backed participant with an optional tool loop.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ReplyStream, TurnContext};
use crate::error::TurnstileError;
use crate::tools::{Tool, ToolArguments};
use crate::types::{Message, Reply, ToolCall, ToolOutcome};

/// Default cap on tool-call rounds within a single turn.
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 4;

/// Tool definition handed to the responder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Everything a responder needs to produce the next response.
#[derive(Debug, Clone)]
pub struct ResponderRequest {
    pub participant: String,
    pub system_message: Option<String>,
    pub task: String,
    pub history: Vec<Message>,
    /// Replies already produced earlier in this turn (tool calls and results).
    pub turn: Vec<Reply>,
    pub tools: Vec<ToolDefinition>,
}

/// A responder's answer: text, tool calls, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl Response {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            text: String::new(),
            tool_calls: calls,
        }
    }
}

/// The model behind a generative participant.
///
/// How a response is computed (provider, prompt format, transport) is the
/// implementor's concern.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, request: &ResponderRequest) -> Result<Response, TurnstileError>;
}

/// Participant that asks a [`Responder`] for each turn and runs any tools it
/// calls.
pub struct GenerativeAgent {
    name: String,
    description: String,
    system_message: Option<String>,
    responder: Arc<dyn Responder>,
    tools: Vec<Box<dyn Tool>>,
    reflect_on_tool_use: bool,
    max_tool_rounds: usize,
}

impl GenerativeAgent {
    pub fn new(name: impl Into<String>, responder: Arc<dyn Responder>) -> Self {
        Self {
            name: name.into(),
            description: "A helpful assistant.".to_string(),
            system_message: None,
            responder,
            tools: Vec::new(),
            reflect_on_tool_use: false,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    /// Add a tool.
    pub fn with_tool(mut self, tool: Box<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// After running tools, ask the responder again instead of summarizing
    /// the tool outputs.
    pub fn reflect_on_tool_use(mut self, reflect: bool) -> Self {
        self.reflect_on_tool_use = reflect;
        self
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters().schema.clone(),
            })
            .collect()
    }

    async fn run_tool(&self, call: &ToolCall) -> ToolOutcome {
        let outcome = match self.tools.iter().find(|t| t.name() == call.name) {
            Some(tool) => tool
                .execute(&ToolArguments::new(call.arguments.clone()))
                .await
                .map_err(|err| err.to_string()),
            None => Err("not found".to_string()),
        };
        match outcome {
            Ok(result) => ToolOutcome {
                tool_call_id: call.id.clone(),
                result,
                is_error: false,
            },
            Err(message) => {
                let err = TurnstileError::ToolExecution {
                    tool_name: call.name.clone(),
                    message,
                };
                warn!(participant = %self.name, error = %err, "tool call failed");
                ToolOutcome {
                    tool_call_id: call.id.clone(),
                    result: serde_json::json!({ "error": err.to_string() }),
                    is_error: true,
                }
            }
        }
    }

    pub(crate) fn act<'a>(&'a self, ctx: TurnContext<'a>) -> ReplyStream<'a> {
        let mut request = ResponderRequest {
            participant: self.name.clone(),
            system_message: self.system_message.clone(),
            task: ctx.task.to_string(),
            history: ctx.history,
            turn: Vec::new(),
            tools: self.tool_definitions(),
        };

        async_stream::try_stream! {
            for round in 0..self.max_tool_rounds {
                debug!(participant = %self.name, round, "requesting response");
                let response = self.responder.respond(&request).await.map_err(|err| match err {
                    TurnstileError::Participant { .. } | TurnstileError::Cancelled => err,
                    other => TurnstileError::participant(&self.name, other.to_string()),
                })?;

                if response.tool_calls.is_empty() {
                    if !response.text.is_empty() {
                        yield Reply::text(response.text);
                    }
                    break;
                }

                if !response.text.is_empty() {
                    let reply = Reply::text(response.text);
                    request.turn.push(reply.clone());
                    yield reply;
                }

                let mut outcomes = Vec::with_capacity(response.tool_calls.len());
                for call in &response.tool_calls {
                    let reply = Reply::tool_call(call);
                    request.turn.push(reply.clone());
                    yield reply;

                    let outcome = self.run_tool(call).await;
                    let reply = Reply::tool_result(&outcome);
                    request.turn.push(reply.clone());
                    yield reply;
                    outcomes.push(outcome);
                }

                let last_round = round + 1 == self.max_tool_rounds;
                if !self.reflect_on_tool_use || last_round {
                    if last_round && self.reflect_on_tool_use {
                        warn!(participant = %self.name, rounds = self.max_tool_rounds, "tool round limit reached");
                    }
                    yield Reply::text(summarize(&outcomes));
                    break;
                }
            }
        }
        .boxed()
    }
}

/// Plain-text rendering of tool outputs, one per line.
fn summarize(outcomes: &[ToolOutcome]) -> String {
    outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
