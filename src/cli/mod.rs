//! CLI for Turnstile.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::SandboxBackendKind;

/// Turnstile CLI
#[derive(Parser, Debug)]
#[command(name = "turnstile", version, about = "Round-robin agents with a code sandbox")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one file in a fresh sandbox
    Exec(ExecArgs),
    /// Take turns with the code executor from the terminal
    Chat(ChatArgs),
}

/// Arguments for `turnstile exec`.
#[derive(Parser, Debug)]
pub struct ExecArgs {
    /// File to execute
    pub file: PathBuf,

    /// Language tag (python, sh); inferred from the file extension when omitted
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Timeout in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Sandbox backend (local, docker)
    #[arg(short, long)]
    pub backend: Option<SandboxBackendKind>,

    /// Container image for the docker backend
    #[arg(long)]
    pub image: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for `turnstile chat`.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Config file (defaults to the platform config directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Task shown to the participants
    pub task: String,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
