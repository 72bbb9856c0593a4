//! Human-in-the-loop participant.

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, Mutex};

use super::{ReplyStream, TurnContext};
use crate::error::TurnstileError;
use crate::types::Reply;

/// Where a human's replies come from.
#[async_trait]
pub trait InputSource: Send + Sync {
    /// Read one line. `Ok(None)` means the source is closed.
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, TurnstileError>;
}

#[async_trait]
impl<T: InputSource + ?Sized> InputSource for std::sync::Arc<T> {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, TurnstileError> {
        (**self).read_line(prompt).await
    }
}

/// Input fed programmatically through an [`InputSender`].
pub struct ChannelInput {
    receiver: Mutex<mpsc::Receiver<String>>,
}

/// Handle used to submit lines to a [`ChannelInput`].
#[derive(Debug, Clone)]
pub struct InputSender {
    sender: mpsc::Sender<String>,
}

impl ChannelInput {
    pub fn new(buffer: usize) -> (Self, InputSender) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (
            Self {
                receiver: Mutex::new(receiver),
            },
            InputSender { sender },
        )
    }
}

impl InputSender {
    pub async fn send(&self, line: impl Into<String>) -> Result<(), TurnstileError> {
        self.sender
            .send(line.into())
            .await
            .map_err(|_| TurnstileError::InvalidState("human input channel closed".to_string()))
    }
}

#[async_trait]
impl InputSource for ChannelInput {
    async fn read_line(&self, _prompt: &str) -> Result<Option<String>, TurnstileError> {
        Ok(self.receiver.lock().await.recv().await)
    }
}

/// Input read from the terminal.
pub struct StdinInput {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl StdinInput {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }
}

impl Default for StdinInput {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InputSource for StdinInput {
    async fn read_line(&self, prompt: &str) -> Result<Option<String>, TurnstileError> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;
        Ok(self.lines.lock().await.next_line().await?)
    }
}

/// Participant whose replies are typed by a person.
///
/// Each turn suspends until one line arrives. The line is appended verbatim,
/// so typing `exit` ends the run when a `TextMention("exit")` condition is
/// configured.
pub struct HumanProxy {
    name: String,
    description: String,
    input: Box<dyn InputSource>,
}

impl HumanProxy {
    pub fn new(name: impl Into<String>, input: impl InputSource + 'static) -> Self {
        Self {
            name: name.into(),
            description: "A human user.".to_string(),
            input: Box::new(input),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn act<'a>(&'a self, ctx: TurnContext<'a>) -> ReplyStream<'a> {
        let cancel = ctx.cancel;
        async_stream::try_stream! {
            let prompt = format!("{}> ", self.name);
            let line = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TurnstileError::Cancelled),
                line = self.input.read_line(&prompt) => line,
            }?;
            let line = line.ok_or_else(|| {
                TurnstileError::participant(&self.name, "input closed before a reply was entered")
            })?;
            yield Reply::text(line.trim_end_matches(['\r', '\n']));
        }
        .boxed()
    }
}
