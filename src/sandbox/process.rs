//! Child-process execution with a hard wall-clock deadline.
//!
//! Every child runs in its own process group. The whole group is killed when
//! the execution ends for any reason, so nothing the program forked outlives
//! it.

use std::collections::HashSet;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use super::backend::RawOutput;
use super::request::OUTPUT_LIMIT_BYTES;
use crate::error::TurnstileError;

/// How long to wait for pipe readers after the child has been killed.
const DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Bytes kept per stream. One past the output limit so truncation stays
/// detectable.
const CAPTURE_LIMIT: usize = OUTPUT_LIMIT_BYTES + 1;

type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Process groups of executions that have not finished yet.
#[derive(Debug, Clone, Default)]
pub(crate) struct ProcessGroups {
    live: Arc<Mutex<HashSet<u32>>>,
}

impl ProcessGroups {
    fn track(&self, pgid: Option<u32>) -> GroupGuard {
        if let (Some(pgid), Ok(mut live)) = (pgid, self.live.lock()) {
            live.insert(pgid);
        }
        GroupGuard {
            groups: self.clone(),
            pgid,
        }
    }

    fn forget(&self, pgid: u32) {
        if let Ok(mut live) = self.live.lock() {
            live.remove(&pgid);
        }
    }

    /// Kill every group still tracked. Returns how many were signalled.
    pub(crate) fn kill_all(&self) -> usize {
        let pgids: Vec<u32> = match self.live.lock() {
            Ok(mut live) => live.drain().collect(),
            Err(_) => return 0,
        };
        for pgid in &pgids {
            kill_group(*pgid);
        }
        pgids.len()
    }
}

/// Kills its process group on drop, including when the run future is
/// dropped mid-execution.
struct GroupGuard {
    groups: ProcessGroups,
    pgid: Option<u32>,
}

impl GroupGuard {
    fn kill(&mut self) {
        if let Some(pgid) = self.pgid.take() {
            kill_group(pgid);
            self.groups.forget(pgid);
        }
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(unix)]
fn kill_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg takes plain integers and touches no memory of ours.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) {}

/// Spawn `cmd`, capture its output, and kill it if it outlives `timeout`.
///
/// Each stream keeps at most [`OUTPUT_LIMIT_BYTES`] plus one byte; the rest
/// is read and discarded so the child never blocks on a full pipe.
pub(crate) async fn run_with_deadline(
    mut cmd: Command,
    timeout: Duration,
    groups: &ProcessGroups,
) -> Result<RawOutput, TurnstileError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd
        .spawn()
        .map_err(|e| TurnstileError::Sandbox(format!("failed to spawn process: {e}")))?;
    let pgid = if cfg!(unix) { child.id() } else { None };
    let mut group = groups.track(pgid);

    let stdout_buf = SharedBuffer::default();
    let stderr_buf = SharedBuffer::default();
    let readers = [
        child.stdout.take().map(|out| drain(out, stdout_buf.clone())),
        child.stderr.take().map(|err| drain(err, stderr_buf.clone())),
    ];

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(status) => (status?.code(), false),
        Err(_) => {
            // Signal the group while the leader is unreaped so its id cannot
            // have been reused.
            group.kill();
            if let Err(err) = child.start_kill() {
                tracing::debug!(error = %err, "timed-out process already gone");
            }
            let _ = child.wait().await;
            (None, true)
        }
    };
    // Background processes left by a program that exited on its own.
    group.kill();

    for reader in readers.into_iter().flatten() {
        let abort = reader.abort_handle();
        if tokio::time::timeout(DRAIN_GRACE, reader).await.is_err() {
            abort.abort();
        }
    }

    Ok(RawOutput {
        stdout: take(&stdout_buf),
        stderr: take(&stderr_buf),
        exit_code,
        timed_out,
    })
}

fn drain<R>(mut pipe: R, buffer: SharedBuffer) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => match buffer.lock() {
                    Ok(mut buf) => {
                        let room = CAPTURE_LIMIT.saturating_sub(buf.len());
                        buf.extend_from_slice(&chunk[..n.min(room)]);
                    }
                    Err(_) => break,
                },
            }
        }
    })
}

fn take(buffer: &SharedBuffer) -> Vec<u8> {
    buffer
        .lock()
        .map(|mut buf| std::mem::take(&mut *buf))
        .unwrap_or_default()
}
