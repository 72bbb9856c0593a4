//! Round-robin turn scheduler.
//!
//! A [`RoundRobinTeam`] owns its participants, termination condition, and
//! optional sandbox for exactly one run. [`RoundRobinTeam::run_stream`]
//! consumes the team and returns a lazy stream of [`RunItem`]s: every
//! appended message as it is produced, then a final [`RunItem::Finished`].

mod fanout;
mod result;

pub use fanout::fan_out;
pub use result::{RunItem, StopReason, TaskResult, SCHEDULER_SOURCE};

use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TurnstileConfig;
use crate::conversation::Conversation;
use crate::error::{ErrorCategory, TurnstileError};
use crate::participant::{Participant, ParticipantBindings, TurnContext};
use crate::sandbox::SandboxExecutor;
use crate::termination::TerminationCondition;
use crate::types::{Message, Reply};
use crate::util::timeout::TurnDeadline;

/// Source name of messages describing sandbox failures.
pub const SANDBOX_SOURCE: &str = "sandbox";

/// Lazy output of one run. Not restartable.
pub type RunStream = BoxStream<'static, RunItem>;

/// Participants taking turns in fixed cyclic order.
pub struct RoundRobinTeam {
    participants: Vec<Participant>,
    termination: TerminationCondition,
    max_turns: usize,
    sandbox: Option<SandboxExecutor>,
    turn_timeout: Option<Duration>,
}

impl std::fmt::Debug for RoundRobinTeam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobinTeam")
            .field("participants", &self.participants)
            .field("termination", &self.termination)
            .field("max_turns", &self.max_turns)
            .field("sandbox", &self.sandbox)
            .finish()
    }
}

impl RoundRobinTeam {
    /// Create a team.
    ///
    /// Fails with a configuration error when there are no participants or
    /// `max_turns` is zero.
    pub fn new(
        participants: Vec<Participant>,
        termination: TerminationCondition,
        max_turns: usize,
    ) -> Result<Self, TurnstileError> {
        if participants.is_empty() {
            return Err(TurnstileError::Configuration(
                "a team needs at least one participant".to_string(),
            ));
        }
        if max_turns == 0 {
            return Err(TurnstileError::Configuration(
                "max_turns must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            participants,
            termination,
            max_turns,
            sandbox: None,
            turn_timeout: None,
        })
    }

    /// Create the team a configuration describes.
    ///
    /// The configuration is validated first, so nothing starts when it is
    /// invalid. Participants are built in configured order, and a sandbox is
    /// attached when any of them executes code.
    pub fn from_config(
        config: &TurnstileConfig,
        bindings: &ParticipantBindings,
    ) -> Result<Self, TurnstileError> {
        config.validate()?;
        let participants = config
            .participants
            .iter()
            .map(|participant| Participant::from_config(participant, bindings))
            .collect::<Result<Vec<_>, _>>()?;

        let mut team = Self::new(participants, config.termination(), config.max_turns)?;
        if team.participants.iter().any(Participant::uses_sandbox) {
            team = team.with_sandbox(SandboxExecutor::from_config(&config.sandbox)?);
        }
        if let Some(secs) = config.turn_timeout_secs {
            team = team.with_turn_timeout(Duration::from_secs(secs));
        }
        Ok(team)
    }

    /// Attach the sandbox. It is started before the first turn and stopped
    /// exactly once when the run ends.
    pub fn with_sandbox(mut self, sandbox: SandboxExecutor) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Bound every turn by a soft deadline. An overrun ends the run as a
    /// participant error.
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = Some(timeout);
        self
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn sandbox(&self) -> Option<&SandboxExecutor> {
        self.sandbox.as_ref()
    }

    /// Run to completion and return the result.
    pub async fn run(
        self,
        task: impl Into<String>,
        cancel: CancellationToken,
    ) -> Result<TaskResult, TurnstileError> {
        let mut stream = self.run_stream(task, cancel);
        let mut finished = None;
        while let Some(item) = stream.next().await {
            if let RunItem::Finished(result) = item {
                finished = Some(result);
            }
        }
        finished.ok_or_else(|| TurnstileError::InvalidState("run ended without a result".to_string()))
    }

    /// Start the run.
    ///
    /// Nothing happens until the stream is polled, and the scheduler suspends
    /// at each yielded item until the consumer asks for the next one.
    /// Dropping the stream abandons the run; a live sandbox is released on
    /// drop.
    pub fn run_stream(self, task: impl Into<String>, cancel: CancellationToken) -> RunStream {
        let task = task.into();
        let Self {
            participants,
            termination,
            max_turns,
            mut sandbox,
            turn_timeout,
        } = self;

        async_stream::stream! {
            let run_id = Uuid::new_v4();
            let mut conversation = Conversation::new();
            let mut stop: Option<StopReason> = None;
            info!(%run_id, participants = participants.len(), max_turns, "run started");

            if let Some(executor) = sandbox.as_mut() {
                let started = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(TurnstileError::Cancelled),
                    started = executor.start() => started,
                };
                match started {
                    Ok(()) => {}
                    Err(TurnstileError::Cancelled) => {
                        info!(%run_id, "run cancelled while the sandbox was starting");
                        yield RunItem::Message(append(&mut conversation, SCHEDULER_SOURCE, Reply::error(TurnstileError::Cancelled.to_string())));
                        stop = Some(StopReason::Cancelled);
                    }
                    Err(err) => {
                        warn!(%run_id, error = %err, "sandbox failed to start");
                        yield RunItem::Message(append(&mut conversation, SANDBOX_SOURCE, Reply::error(err.to_string())));
                        stop = Some(StopReason::SandboxError);
                    }
                }
            }

            let mut turn: usize = 0;
            while stop.is_none() {
                if cancel.is_cancelled() {
                    yield RunItem::Message(append(&mut conversation, SCHEDULER_SOURCE, Reply::error(TurnstileError::Cancelled.to_string())));
                    stop = Some(StopReason::Cancelled);
                    break;
                }

                let participant = &participants[turn % participants.len()];
                let name = participant.name();
                debug!(%run_id, turn, participant = name, "turn started");

                let mut ctx = TurnContext::new(conversation.snapshot(), &task)
                    .with_cancel(cancel.child_token());
                if participant.uses_sandbox() {
                    ctx.sandbox = sandbox.as_mut();
                }
                let deadline = TurnDeadline::start(name, turn_timeout);
                let mut replies = participant.act(ctx);

                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => Err(TurnstileError::Cancelled),
                        next = deadline.run(replies.next()) => next,
                    };
                    match next {
                        Ok(Some(Ok(reply))) => {
                            yield RunItem::Message(append(&mut conversation, name, reply));
                            let outcome = termination.evaluate(&conversation, turn);
                            if outcome.stopped {
                                stop = Some(StopReason::from_termination(outcome.reason));
                                break;
                            }
                        }
                        Ok(None) => break,
                        Ok(Some(Err(err))) | Err(err) => {
                            let (source, reason) = match err.category() {
                                ErrorCategory::Cancelled => (SCHEDULER_SOURCE, StopReason::Cancelled),
                                ErrorCategory::Sandbox => (name, StopReason::SandboxError),
                                _ => (name, StopReason::ParticipantError),
                            };
                            warn!(%run_id, turn, participant = name, error = %err, "turn failed");
                            yield RunItem::Message(append(&mut conversation, source, Reply::error(err.to_string())));
                            stop = Some(reason);
                            break;
                        }
                    }
                }
                drop(replies);
                debug!(%run_id, turn, participant = name, "turn finished");

                if stop.is_some() {
                    break;
                }
                turn += 1;
                let outcome = termination.evaluate(&conversation, turn);
                if outcome.stopped {
                    stop = Some(StopReason::from_termination(outcome.reason));
                } else if turn >= max_turns {
                    stop = Some(StopReason::MaxTurns);
                }
            }

            if let Some(executor) = sandbox.as_mut() {
                if let Err(err) = executor.stop().await {
                    warn!(%run_id, error = %err, "sandbox teardown failed");
                }
            }

            let stop_reason = stop.unwrap_or(StopReason::MaxTurns);
            info!(
                %run_id,
                turns = turn,
                messages = conversation.len(),
                reason = %stop_reason,
                "run finished"
            );
            yield RunItem::Finished(TaskResult {
                messages: conversation.into_messages(),
                stop_reason,
            });
        }
        .boxed()
    }
}

fn append(conversation: &mut Conversation, source: &str, reply: Reply) -> Message {
    conversation.append(source, reply).clone()
}
