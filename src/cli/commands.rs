//! Handlers for the CLI subcommands.

use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{ChatArgs, ExecArgs};
use crate::config::{ParticipantConfig, TurnstileConfig};
use crate::error::TurnstileError;
use crate::participant::{ParticipantBindings, ParticipantKind, StdinInput};
use crate::sandbox::{ExecutionRequest, ExecutionResult, SandboxExecutor};
use crate::team::{RoundRobinTeam, RunItem};
use crate::types::{Message, MessageKind};

/// Language tag for a file, from its extension.
pub fn language_for(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "py" => Some("python"),
        "sh" | "bash" => Some("sh"),
        _ => None,
    }
}

/// `turnstile exec`: start a sandbox, run one file, print the result, stop.
pub async fn handle_exec(args: ExecArgs) -> Result<i32, TurnstileError> {
    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        config.sandbox.backend = backend;
    }
    if let Some(image) = args.image {
        config.sandbox.image = image;
    }
    if let Some(timeout) = args.timeout {
        config.sandbox.timeout_secs = timeout;
    }
    config.sandbox.validate()?;

    let language = match args.lang.as_deref() {
        Some(lang) => lang.to_string(),
        None => language_for(&args.file)
            .ok_or_else(|| {
                TurnstileError::InvalidArgument(format!(
                    "cannot infer language of {}; pass --lang",
                    args.file.display()
                ))
            })?
            .to_string(),
    };
    let code = tokio::fs::read_to_string(&args.file).await?;

    let mut sandbox = SandboxExecutor::from_config(&config.sandbox)?;
    let outcome = match sandbox.start().await {
        Ok(()) => sandbox
            .execute(&ExecutionRequest::new(code, language))
            .await,
        Err(err) => Err(err),
    };
    if let Err(err) = sandbox.stop().await {
        tracing::warn!(error = %err, "sandbox teardown failed");
    }

    let result = outcome?;
    print_result(&result, Duration::from_secs(config.sandbox.timeout_secs));
    Ok(result.exit_code)
}

fn print_result(result: &ExecutionResult, timeout: Duration) {
    if !result.stdout.is_empty() {
        print!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprint!("{}", result.stderr);
    }
    if result.timed_out {
        eprintln!("timed out after {}s", timeout.as_secs());
    }
    for (name, bytes) in &result.artifacts {
        eprintln!("artifact: {name} ({} bytes)", bytes.len());
    }
    eprintln!("exit code: {}", result.exit_code);
}

/// Participants of `turnstile chat` when the config names none.
fn default_chat_participants() -> Vec<ParticipantConfig> {
    vec![
        ParticipantConfig::new("user", ParticipantKind::Human),
        ParticipantConfig::new("executor", ParticipantKind::Executor),
    ]
}

/// Config for `turnstile chat`, falling back to the terminal user and a code
/// executor.
pub fn chat_config(mut config: TurnstileConfig) -> TurnstileConfig {
    if config.participants.is_empty() {
        config.participants = default_chat_participants();
    }
    config
}

/// `turnstile chat`: the configured participants take turns, with human
/// participants reading from the terminal.
pub async fn handle_chat(args: ChatArgs) -> Result<(), TurnstileError> {
    let config = chat_config(TurnstileConfig::load(args.config.as_deref())?);
    let bindings = ParticipantBindings::new().with_input(StdinInput::new());
    let team = RoundRobinTeam::from_config(&config, &bindings)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    println!("Task: {}", args.task);
    let mut stream = team.run_stream(args.task, cancel);
    while let Some(item) = stream.next().await {
        match item {
            RunItem::Message(message) => render(&message),
            RunItem::Finished(result) => render(&result.summary()),
        }
    }
    Ok(())
}

fn render(message: &Message) {
    match message.kind {
        MessageKind::Error => eprintln!("[{}] error: {}", message.source, message.content),
        MessageKind::RunSummary => println!("---------- {} ----------", message.content),
        _ => println!("---------- {} ----------\n{}", message.source, message.content),
    }
}
