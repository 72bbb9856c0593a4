//! Round-robin scheduler behavior.

mod common;

use std::time::{Duration, Instant};

use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use turnstile::error::TurnstileError;
use turnstile::participant::{ChannelInput, CodeExecutorAgent, HumanProxy, Participant};
use turnstile::sandbox::SandboxExecutor;
use turnstile::team::{fan_out, RoundRobinTeam, RunItem, StopReason, TaskResult};
use turnstile::termination::TerminationCondition;
use turnstile::tools::{FnTool, ToolArguments, ToolParameters};
use turnstile::types::MessageKind;

use common::{
    agent, process_alive, read_pid_file, recording_sandbox, RecordingBackend, ScriptedResponder,
};

const RUN_TIMEOUT: Duration = Duration::from_secs(20);

async fn run(team: RoundRobinTeam, task: &str) -> TaskResult {
    timeout(RUN_TIMEOUT, team.run(task, CancellationToken::new()))
        .await
        .expect("run should finish")
        .expect("run should produce a result")
}

fn sources(result: &TaskResult) -> Vec<&str> {
    result.messages.iter().map(|m| m.source.as_str()).collect()
}

#[tokio::test]
async fn max_turns_alone_runs_exactly_n_turns() {
    let a = ScriptedResponder::always("from A");
    let b = ScriptedResponder::always("from B");
    let team = RoundRobinTeam::new(
        vec![agent("A", &a).into(), agent("B", &b).into()],
        TerminationCondition::max_turns(2),
        10,
    )
    .unwrap();

    let result = run(team, "greet").await;
    assert_eq!(sources(&result), vec!["A", "B"]);
    assert_eq!(result.stop_reason, StopReason::MaxTurns);
    assert_eq!(result.stop_reason.to_string(), "max_turns");
}

#[tokio::test]
async fn scheduler_turn_limit_reports_max_turns() {
    let a = ScriptedResponder::always("from A");
    let b = ScriptedResponder::always("from B");
    let team = RoundRobinTeam::new(
        vec![agent("A", &a).into(), agent("B", &b).into()],
        TerminationCondition::text_mention("STOP"),
        2,
    )
    .unwrap();

    let result = run(team, "greet").await;
    assert_eq!(result.messages.len(), 2);
    assert_eq!(result.stop_reason, StopReason::MaxTurns);
}

#[tokio::test]
async fn text_mention_stops_at_first_matching_message() {
    let a = ScriptedResponder::always("working on it");
    let b = ScriptedResponder::always("all done. STOP");
    let team = RoundRobinTeam::new(
        vec![agent("A", &a).into(), agent("B", &b).into()],
        TerminationCondition::text_mention("STOP"),
        10,
    )
    .unwrap();

    let result = run(team, "finish").await;
    assert_eq!(sources(&result), vec!["A", "B"]);
    assert_eq!(
        result.stop_reason,
        StopReason::Termination("text_mention:STOP".to_string())
    );
    assert_eq!(result.stop_reason.to_string(), "termination:text_mention:STOP");
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn termination_is_checked_after_every_message_within_a_turn() {
    let researcher = ScriptedResponder::new();
    researcher.queue_tool_call("call-1", "lookup", serde_json::json!({ "query": "maze" }));
    let lookup = FnTool::new(
        "lookup",
        "Look something up",
        ToolParameters::object().string("query", "Query", true).build(),
        |_args: ToolArguments| async move { Ok(serde_json::json!("found it. STOP")) },
    );
    let team = RoundRobinTeam::new(
        vec![agent("researcher", &researcher)
            .with_tool(Box::new(lookup))
            .into()],
        TerminationCondition::text_mention("STOP"),
        5,
    )
    .unwrap();

    let result = run(team, "search").await;
    let kinds: Vec<MessageKind> = result.messages.iter().map(|m| m.kind).collect();
    assert_eq!(kinds, vec![MessageKind::ToolCall, MessageKind::ToolResult]);
    assert_eq!(result.stop_reason.to_string(), "termination:text_mention:STOP");
}

#[tokio::test]
async fn turns_follow_cyclic_participant_order() {
    let responders: Vec<_> = ["p0", "p1", "p2"]
        .iter()
        .map(|name| (name.to_string(), ScriptedResponder::always(name)))
        .collect();
    let participants: Vec<Participant> = responders
        .iter()
        .map(|(name, responder)| agent(name, responder).into())
        .collect();
    let team =
        RoundRobinTeam::new(participants, TerminationCondition::max_turns(7), 7).unwrap();

    let result = run(team, "count").await;
    let expected: Vec<String> = (0..7).map(|t| format!("p{}", t % 3)).collect();
    assert_eq!(sources(&result), expected);

    let sequences: Vec<u64> = result.messages.iter().map(|m| m.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(sequences.first(), Some(&1));
}

#[tokio::test]
async fn failed_sandbox_start_yields_single_error_and_stops_once() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, calls) = RecordingBackend::failing_start();
    let sandbox = SandboxExecutor::new(backend, dir.path(), Duration::from_secs(5));
    let coder = ScriptedResponder::always("```sh\necho hi\n```");
    let team = RoundRobinTeam::new(
        vec![
            agent("coder", &coder).into(),
            CodeExecutorAgent::new("executor").into(),
        ],
        TerminationCondition::text_mention("STOP"),
        4,
    )
    .unwrap()
    .with_sandbox(sandbox);

    let result = run(team, "write code").await;
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].kind, MessageKind::Error);
    assert_eq!(result.messages[0].source, "sandbox");
    assert_eq!(result.stop_reason, StopReason::SandboxError);
    assert_eq!(result.stop_reason.to_string(), "sandbox_error");
    assert_eq!(calls.starts(), 1);
    assert_eq!(calls.stops(), 1);
    assert_eq!(coder.calls(), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn executor_runs_code_and_stops_sandbox_once() {
    let dir = tempfile::tempdir().unwrap();
    let (sandbox, calls) = recording_sandbox(dir.path(), Duration::from_secs(10));
    let coder = ScriptedResponder::new();
    coder.queue_response("```sh\necho hello from the sandbox\n```");
    coder.queue_response("Looks good. STOP");
    let team = RoundRobinTeam::new(
        vec![
            agent("coder", &coder).into(),
            CodeExecutorAgent::new("executor").into(),
        ],
        TerminationCondition::text_mention("STOP"),
        10,
    )
    .unwrap()
    .with_sandbox(sandbox);

    let result = run(team, "print a greeting").await;
    assert_eq!(sources(&result), vec!["coder", "executor", "coder"]);
    let output = &result.messages[1];
    assert_eq!(output.kind, MessageKind::ToolResult);
    assert!(output.content.starts_with("exit code: 0"));
    assert!(output.content.contains("hello from the sandbox"));
    assert_eq!(calls.starts(), 1);
    assert_eq!(calls.runs(), 1);
    assert_eq!(calls.stops(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn execution_timeout_is_reported_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let (sandbox, calls) = recording_sandbox(dir.path(), Duration::from_secs(1));
    let (input, sender) = ChannelInput::new(4);
    sender
        .send("```sh\nwhile true; do :; done\n```")
        .await
        .unwrap();
    sender.send("```sh\necho still alive\n```").await.unwrap();
    let team = RoundRobinTeam::new(
        vec![
            HumanProxy::new("user", input).into(),
            CodeExecutorAgent::new("executor").into(),
        ],
        TerminationCondition::text_mention("STOP"),
        4,
    )
    .unwrap()
    .with_sandbox(sandbox);

    let started = Instant::now();
    let result = run(team, "loop forever").await;
    assert!(started.elapsed() < Duration::from_secs(10));

    let executor_replies: Vec<&str> = result
        .messages_from("executor")
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(executor_replies.len(), 2);
    assert!(executor_replies[0].starts_with("exit code: 124"));
    assert!(executor_replies[0].contains("timed out after 1s"));
    assert!(executor_replies[1].contains("still alive"));
    assert!(result.messages.iter().all(|m| m.kind != MessageKind::Error));
    assert_eq!(result.stop_reason, StopReason::MaxTurns);
    assert_eq!(calls.stops(), 1);
}

#[tokio::test]
async fn failed_execution_ends_run_with_sandbox_error_and_stops_once() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, calls) = RecordingBackend::failing_run();
    let sandbox = SandboxExecutor::new(backend, dir.path(), Duration::from_secs(5));
    let coder = ScriptedResponder::always("```sh\necho hi\n```");
    let team = RoundRobinTeam::new(
        vec![
            agent("coder", &coder).into(),
            CodeExecutorAgent::new("executor").into(),
        ],
        TerminationCondition::text_mention("STOP"),
        6,
    )
    .unwrap()
    .with_sandbox(sandbox);

    let result = run(team, "write code").await;
    assert_eq!(sources(&result), vec!["coder", "executor"]);
    assert_eq!(result.messages[1].kind, MessageKind::Error);
    assert!(result.messages[1]
        .content
        .contains("container exited unexpectedly"));
    assert_eq!(result.stop_reason, StopReason::SandboxError);
    assert_eq!(calls.starts(), 1);
    assert_eq!(calls.runs(), 1);
    assert_eq!(calls.stops(), 1);
    assert_eq!(coder.calls(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn cancellation_during_execution_kills_program_and_stops_once() {
    let dir = tempfile::tempdir().unwrap();
    let (sandbox, calls) = recording_sandbox(dir.path(), Duration::from_secs(60));
    let coder = ScriptedResponder::always("```sh\necho $$ > loop.pid\nwhile true; do :; done\n```");
    let team = RoundRobinTeam::new(
        vec![
            agent("coder", &coder).into(),
            CodeExecutorAgent::new("executor").into(),
        ],
        TerminationCondition::text_mention("STOP"),
        6,
    )
    .unwrap()
    .with_sandbox(sandbox);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let pid_file = dir.path().join("loop.pid");
    let watched = pid_file.clone();
    tokio::spawn(async move {
        read_pid_file(&watched).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = timeout(RUN_TIMEOUT, team.run("spin", cancel))
        .await
        .expect("cancelled run should finish")
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(sources(&result), vec!["coder", "turnstile"]);
    assert_eq!(calls.runs(), 1);
    assert_eq!(calls.stops(), 1);

    let pid = read_pid_file(&pid_file).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!process_alive(pid), "cancelled program {pid} is still running");
}

#[tokio::test]
async fn participant_failure_ends_run_with_error_message() {
    let a = ScriptedResponder::always("first");
    let b = ScriptedResponder::new();
    b.queue_error("model unavailable");
    let team = RoundRobinTeam::new(
        vec![agent("A", &a).into(), agent("B", &b).into()],
        TerminationCondition::text_mention("STOP"),
        10,
    )
    .unwrap();

    let result = run(team, "chat").await;
    assert_eq!(sources(&result), vec!["A", "B"]);
    assert_eq!(result.messages[1].kind, MessageKind::Error);
    assert!(result.messages[1].content.contains("model unavailable"));
    assert_eq!(result.stop_reason, StopReason::ParticipantError);
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn cancellation_appends_error_and_still_stops_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let (sandbox, calls) = recording_sandbox(dir.path(), Duration::from_secs(5));
    let (input, _sender) = ChannelInput::new(1);
    let team = RoundRobinTeam::new(
        vec![HumanProxy::new("user", input).into()],
        TerminationCondition::text_mention("STOP"),
        5,
    )
    .unwrap()
    .with_sandbox(sandbox);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = timeout(RUN_TIMEOUT, team.run("wait", cancel))
        .await
        .expect("cancelled run should finish")
        .unwrap();
    assert_eq!(result.stop_reason, StopReason::Cancelled);
    let last = result.messages.last().expect("cancellation message");
    assert_eq!(last.kind, MessageKind::Error);
    assert_eq!(last.source, "turnstile");
    assert_eq!(calls.stops(), 1);
}

#[tokio::test]
async fn cancellation_interrupts_slow_sandbox_start() {
    let dir = tempfile::tempdir().unwrap();
    let (backend, calls) = RecordingBackend::new();
    let backend = backend.with_start_delay(Duration::from_secs(60));
    let sandbox = SandboxExecutor::new(backend, dir.path(), Duration::from_secs(5));
    let coder = ScriptedResponder::new();
    let team = RoundRobinTeam::new(
        vec![
            agent("coder", &coder).into(),
            CodeExecutorAgent::new("executor").into(),
        ],
        TerminationCondition::text_mention("STOP"),
        4,
    )
    .unwrap()
    .with_sandbox(sandbox);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = timeout(RUN_TIMEOUT, team.run("pull the image", cancel))
        .await
        .expect("cancelled run should finish")
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.stop_reason, StopReason::Cancelled);
    assert_eq!(sources(&result), vec!["turnstile"]);
    assert_eq!(calls.starts(), 1);
    assert_eq!(calls.stops(), 1);
    assert_eq!(coder.calls(), 0);
}

#[tokio::test]
async fn turn_timeout_ends_run_as_participant_error() {
    let (input, _sender) = ChannelInput::new(1);
    let team = RoundRobinTeam::new(
        vec![HumanProxy::new("user", input).into()],
        TerminationCondition::text_mention("STOP"),
        5,
    )
    .unwrap()
    .with_turn_timeout(Duration::from_millis(100));

    let result = run(team, "answer quickly").await;
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].source, "user");
    assert!(result.messages[0].content.contains("timed out"));
    assert_eq!(result.stop_reason, StopReason::ParticipantError);
}

#[tokio::test]
async fn human_exit_is_appended_verbatim() {
    let (input, sender) = ChannelInput::new(2);
    sender.send("exit").await.unwrap();
    let team = RoundRobinTeam::new(
        vec![HumanProxy::new("user", input).into()],
        TerminationCondition::text_mention("exit"),
        5,
    )
    .unwrap();

    let result = run(team, "chat").await;
    assert_eq!(result.messages.len(), 1);
    assert_eq!(result.messages[0].content, "exit");
    assert_eq!(result.stop_reason.to_string(), "termination:text_mention:exit");
}

#[tokio::test]
async fn empty_team_is_configuration_error() {
    let err = RoundRobinTeam::new(Vec::new(), TerminationCondition::max_turns(1), 3).unwrap_err();
    assert!(matches!(err, TurnstileError::Configuration(_)));

    let a = ScriptedResponder::new();
    let err = RoundRobinTeam::new(
        vec![agent("A", &a).into()],
        TerminationCondition::max_turns(1),
        0,
    )
    .unwrap_err();
    assert!(matches!(err, TurnstileError::Configuration(_)));
}

#[tokio::test]
async fn stream_yields_messages_then_finished() {
    let a = ScriptedResponder::always("hello");
    let team = RoundRobinTeam::new(
        vec![agent("A", &a).into()],
        TerminationCondition::max_turns(3),
        3,
    )
    .unwrap();

    let items: Vec<RunItem> = team
        .run_stream("greet", CancellationToken::new())
        .collect()
        .await;
    assert_eq!(items.len(), 4);
    assert!(items[..3].iter().all(|item| item.as_message().is_some()));
    match items.last() {
        Some(RunItem::Finished(result)) => {
            assert_eq!(result.messages.len(), 3);
            let summary = result.summary();
            assert_eq!(summary.kind, MessageKind::RunSummary);
            assert_eq!(summary.sequence, 4);
        }
        other => panic!("expected Finished, got {other:?}"),
    }
}

#[tokio::test]
async fn stream_does_nothing_until_polled() {
    let a = ScriptedResponder::always("hello");
    let team = RoundRobinTeam::new(
        vec![agent("A", &a).into()],
        TerminationCondition::max_turns(2),
        2,
    )
    .unwrap();

    let mut stream = team.run_stream("greet", CancellationToken::new());
    tokio::task::yield_now().await;
    assert_eq!(a.calls(), 0);

    let first = stream.next().await.expect("first item");
    assert_eq!(first.as_message().map(|m| m.content.as_str()), Some("hello"));
    assert_eq!(a.calls(), 1);
}

#[tokio::test]
async fn fan_out_delivers_every_item_to_every_subscriber() {
    let a = ScriptedResponder::always("hello");
    let team = RoundRobinTeam::new(
        vec![agent("A", &a).into()],
        TerminationCondition::max_turns(3),
        3,
    )
    .unwrap();

    let cancel = CancellationToken::new();
    let (subscribers, handle) = fan_out(team.run_stream("greet", cancel.clone()), 2, cancel);
    let collected = futures::future::join_all(
        subscribers
            .into_iter()
            .map(|s| s.collect::<Vec<RunItem>>()),
    )
    .await;
    timeout(RUN_TIMEOUT, handle).await.unwrap().unwrap();

    assert_eq!(collected.len(), 2);
    assert_eq!(collected[0], collected[1]);
    assert_eq!(collected[0].len(), 4);
}

#[tokio::test]
async fn abandoned_fan_out_cancels_run_and_stops_sandbox() {
    let dir = tempfile::tempdir().unwrap();
    let work = dir.path().join("session");
    let (backend, calls) = RecordingBackend::new();
    let sandbox = SandboxExecutor::new(backend, &work, Duration::from_secs(5)).keep_work_dir(false);
    let (input, _sender) = ChannelInput::new(1);
    let team = RoundRobinTeam::new(
        vec![
            HumanProxy::new("user", input).into(),
            CodeExecutorAgent::new("executor").into(),
        ],
        TerminationCondition::text_mention("STOP"),
        10,
    )
    .unwrap()
    .with_sandbox(sandbox);

    let cancel = CancellationToken::new();
    let (subscribers, handle) = fan_out(team.run_stream("wait", cancel.clone()), 2, cancel.clone());
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(subscribers);

    timeout(RUN_TIMEOUT, handle)
        .await
        .expect("abandoned run should wind down")
        .unwrap();
    assert!(cancel.is_cancelled());
    assert_eq!(calls.starts(), 1);
    assert_eq!(calls.stops(), 1);
    assert!(!work.exists());
}
