//! Shared test helpers: a scripted responder and a recording sandbox backend.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use turnstile::error::TurnstileError;
use turnstile::participant::{GenerativeAgent, Responder, ResponderRequest, Response};
use turnstile::sandbox::{
    LocalProcessBackend, PreparedProgram, RawOutput, SandboxBackend, SandboxExecutor,
    SandboxSession,
};
use turnstile::types::ToolCall;

/// A responder that replays queued responses, then a fixed fallback text.
pub struct ScriptedResponder {
    responses: Mutex<VecDeque<Result<Response, String>>>,
    fallback: String,
    calls: AtomicUsize,
}

impl ScriptedResponder {
    pub fn new() -> Arc<Self> {
        Self::always("Mock response")
    }

    /// Answer every request with `text`.
    pub fn always(text: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    /// Queue a text response.
    pub fn queue_response(&self, text: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(Response::text(text)));
    }

    /// Queue a tool call response.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Ok(Response::tool_calls(vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments: args,
            }])));
    }

    /// Queue a failure.
    pub fn queue_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Responder for ScriptedResponder {
    async fn respond(&self, request: &ResponderRequest) -> Result<Response, TurnstileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(TurnstileError::participant(&request.participant, message)),
            None => Ok(Response::text(self.fallback.clone())),
        }
    }
}

/// Generative participant backed by `responder`.
pub fn agent(name: &str, responder: &Arc<ScriptedResponder>) -> GenerativeAgent {
    GenerativeAgent::new(name, responder.clone())
}

/// Call counters shared between a [`RecordingBackend`] and the test.
#[derive(Debug, Default)]
pub struct BackendCalls {
    pub starts: AtomicUsize,
    pub runs: AtomicUsize,
    pub stops: AtomicUsize,
}

impl BackendCalls {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

/// Local-process backend that counts lifecycle calls and can fail on start.
pub struct RecordingBackend {
    inner: LocalProcessBackend,
    calls: Arc<BackendCalls>,
    fail_start: bool,
    fail_run: bool,
    start_delay: Duration,
}

impl RecordingBackend {
    pub fn new() -> (Self, Arc<BackendCalls>) {
        Self::build(false, false)
    }

    /// A backend whose `start` always fails, like a missing container image.
    pub fn failing_start() -> (Self, Arc<BackendCalls>) {
        Self::build(true, false)
    }

    /// A backend that starts but fails every execution, like a container
    /// that died mid-run.
    pub fn failing_run() -> (Self, Arc<BackendCalls>) {
        Self::build(false, true)
    }

    /// Make `start` take this long, like pulling a container image.
    pub fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    fn build(fail_start: bool, fail_run: bool) -> (Self, Arc<BackendCalls>) {
        let calls = Arc::new(BackendCalls::default());
        (
            Self {
                inner: LocalProcessBackend::new(),
                calls: calls.clone(),
                fail_start,
                fail_run,
                start_delay: Duration::ZERO,
            },
            calls,
        )
    }
}

#[async_trait]
impl SandboxBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self, session: &SandboxSession) -> Result<(), TurnstileError> {
        self.calls.starts.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.start_delay).await;
        if self.fail_start {
            return Err(TurnstileError::Sandbox(
                "image python:3.11-slim not found".to_string(),
            ));
        }
        self.inner.start(session).await
    }

    async fn run(
        &self,
        session: &SandboxSession,
        program: &PreparedProgram,
        timeout: Duration,
    ) -> Result<RawOutput, TurnstileError> {
        self.calls.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail_run {
            return Err(TurnstileError::Sandbox(
                "container exited unexpectedly".to_string(),
            ));
        }
        self.inner.run(session, program, timeout).await
    }

    async fn stop(&self, session: &SandboxSession) -> Result<(), TurnstileError> {
        self.calls.stops.fetch_add(1, Ordering::SeqCst);
        self.inner.stop(session).await
    }
}

/// Whether `pid` names a live process. Zombies count as dead.
pub fn process_alive(pid: u32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        return !stat
            .rsplit_once(')')
            .is_some_and(|(_, rest)| rest.trim_start().starts_with('Z'));
    }
    if cfg!(target_os = "linux") {
        return false;
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Poll for a pid the sandboxed program wrote to `path`.
pub async fn read_pid_file(path: &std::path::Path) -> u32 {
    for _ in 0..100 {
        if let Ok(text) = tokio::fs::read_to_string(path).await {
            if let Ok(pid) = text.trim().parse() {
                return pid;
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("no pid written to {}", path.display());
}

/// Executor over a [`RecordingBackend`] in `dir`.
pub fn recording_sandbox(
    dir: &std::path::Path,
    timeout: Duration,
) -> (SandboxExecutor, Arc<BackendCalls>) {
    let (backend, calls) = RecordingBackend::new();
    (SandboxExecutor::new(backend, dir, timeout), calls)
}
