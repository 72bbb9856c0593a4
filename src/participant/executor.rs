//! Participant that runs fenced code blocks in the run's sandbox.

use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use sha2::{Digest, Sha256};
use tracing::info;

use super::{ReplyStream, TurnContext};
use crate::error::TurnstileError;
use crate::sandbox::{ExecutionRequest, ExecutionResult};
use crate::types::{Message, Reply};

const DEFAULT_LANGUAGE: &str = "python";

/// A fenced markdown code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
}

static CODE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([\w+\-]*)[ \t]*\r?\n(.*?)```").expect("code block regex must compile")
});

/// Extract fenced code blocks in order. Untagged blocks default to python.
pub fn extract_code_blocks(text: &str) -> Vec<CodeBlock> {
    CODE_BLOCK_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let code = caps.get(2)?.as_str();
            if code.trim().is_empty() {
                return None;
            }
            let tag = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            Some(CodeBlock {
                language: if tag.is_empty() {
                    DEFAULT_LANGUAGE.to_string()
                } else {
                    tag.to_ascii_lowercase()
                },
                code: code.to_string(),
            })
        })
        .collect()
}

/// Proxy that executes code written by other participants.
///
/// On its turn it collects the code blocks from every message since its own
/// last reply, runs them in order, and answers with a single tool result.
/// Execution stops at the first block that fails or times out.
pub struct CodeExecutorAgent {
    name: String,
    description: String,
    timeout: Option<Duration>,
}

impl CodeExecutorAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "Executes code blocks found in the conversation.".to_string(),
            timeout: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Per-block timeout overriding the session default.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    fn pending_blocks(&self, history: &[Message]) -> Vec<CodeBlock> {
        let start = history
            .iter()
            .rposition(|m| m.source == self.name)
            .map_or(0, |i| i + 1);
        history[start..]
            .iter()
            .flat_map(|m| extract_code_blocks(&m.content))
            .collect()
    }

    pub(crate) fn act<'a>(&'a self, ctx: TurnContext<'a>) -> ReplyStream<'a> {
        let TurnContext {
            history, sandbox, ..
        } = ctx;
        let blocks = self.pending_blocks(&history);

        async_stream::try_stream! {
            if blocks.is_empty() {
                yield Reply::text(
                    "No code blocks found in the previous messages. \
                     Provide the code to run in a fenced block such as ```python.",
                );
            } else {
                let sandbox = sandbox.ok_or_else(|| {
                    TurnstileError::participant(&self.name, "no sandbox is available for execution")
                })?;

                let mut report = String::new();
                let mut exit_code = 0;
                for (index, block) in blocks.iter().enumerate() {
                    let mut request = ExecutionRequest::new(block.code.clone(), block.language.clone());
                    if let Some(timeout) = self.timeout {
                        request = request.with_timeout(timeout);
                    }
                    let timeout = request.timeout_override.unwrap_or(sandbox.session().timeout());
                    let result = sandbox.execute(&request).await?;
                    info!(
                        participant = %self.name,
                        block = index,
                        language = %block.language,
                        exit_code = result.exit_code,
                        timed_out = result.timed_out,
                        "code block executed"
                    );
                    render_block(&mut report, index, &block.language, &result, timeout);
                    exit_code = result.exit_code;
                    if !result.succeeded() {
                        break;
                    }
                }
                yield Reply::tool_output(format!("exit code: {exit_code}\n{report}"));
            }
        }
        .boxed()
    }
}

fn render_block(
    out: &mut String,
    index: usize,
    language: &str,
    result: &ExecutionResult,
    timeout: Duration,
) {
    let _ = write!(out, "\n[block {} ({language})] ", index + 1);
    if result.timed_out {
        let err = TurnstileError::ExecutionTimeout {
            seconds: timeout.as_secs(),
        };
        let _ = writeln!(out, "{err}");
    } else {
        let _ = writeln!(out, "exit code {}", result.exit_code);
    }
    if !result.stdout.is_empty() {
        let _ = writeln!(out, "stdout:\n{}", result.stdout.trim_end());
    }
    if !result.stderr.is_empty() {
        let _ = writeln!(out, "stderr:\n{}", result.stderr.trim_end());
    }
    if !result.artifacts.is_empty() {
        let _ = writeln!(out, "artifacts:");
        for (name, bytes) in &result.artifacts {
            let digest = Sha256::digest(bytes);
            let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
            let _ = writeln!(out, "- {name} ({} bytes, sha256 {hex})", bytes.len());
        }
    }
}
