//! Soft per-turn deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::TurnstileError;

/// Deadline shared by every poll of one participant's turn.
#[derive(Debug, Clone)]
pub struct TurnDeadline {
    participant: String,
    limit: Option<(Duration, Instant)>,
}

impl TurnDeadline {
    /// Start the clock now. `None` means the turn is unbounded.
    pub fn start(participant: impl Into<String>, limit: Option<Duration>) -> Self {
        Self {
            participant: participant.into(),
            limit: limit.map(|d| (d, Instant::now() + d)),
        }
    }

    /// Await `future`, failing with a participant error once the turn's
    /// deadline has passed.
    pub async fn run<T>(&self, future: impl Future<Output = T>) -> Result<T, TurnstileError> {
        let Some((duration, at)) = self.limit else {
            return Ok(future.await);
        };
        tokio::time::timeout_at(at, future).await.map_err(|_| {
            TurnstileError::participant(
                &self.participant,
                format!("turn timed out after {}ms", duration.as_millis()),
            )
        })
    }
}
