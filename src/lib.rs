//! Turnstile: round-robin multi-participant conversations with sandboxed
//! code execution.
//!
//! A [`RoundRobinTeam`](team::RoundRobinTeam) lets a fixed set of
//! participants (model-backed agents, a human proxy, a code executor) take
//! turns appending messages to a shared conversation until a
//! [`TerminationCondition`](termination::TerminationCondition) matches or the
//! turn limit is reached. Code found in the conversation runs in a
//! [`SandboxExecutor`](sandbox::SandboxExecutor) that is started before the
//! first turn and always stopped when the run ends.
//!
//! # Quick Start
//!
//! ```no_run
//! use turnstile::prelude::*;
//!
//! # async fn example() -> turnstile::error::Result<()> {
//! let (input, sender) = ChannelInput::new(8);
//! sender.send("```sh\necho hello\n```").await?;
//!
//! let team = RoundRobinTeam::new(
//!     vec![
//!         HumanProxy::new("user", input).into(),
//!         CodeExecutorAgent::new("executor").into(),
//!     ],
//!     TerminationCondition::text_mention("STOP"),
//!     2,
//! )?
//! .with_sandbox(SandboxExecutor::new(
//!     LocalProcessBackend::new(),
//!     "tmp",
//!     std::time::Duration::from_secs(30),
//! ));
//!
//! let result = team.run("say hello", CancellationToken::new()).await?;
//! println!("{}", result.summary().content);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conversation;
pub mod error;
pub mod participant;
pub mod prelude;
pub mod sandbox;
pub mod team;
pub mod termination;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
