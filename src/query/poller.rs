//! Status polling with a monotonic deadline.
//!
//! The poller never cancels the remote execution. When the deadline passes it
//! hands back the last status it saw and the job keeps running on the engine.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::PollingConfig;
use crate::engine::{ExecutionId, ExecutionStatus, QueryEngine};
use crate::error::{AthenaError, Result};

/// Poll timing and retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay after the first non-terminal observation.
    pub initial_interval: Duration,
    /// Ceiling for the doubling delay.
    pub max_interval: Duration,
    /// Consecutive transient failures tolerated.
    pub max_transient_retries: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            initial_interval: Duration::from_millis(config.initial_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            max_transient_retries: config.max_transient_retries,
        }
    }
}

impl PollPolicy {
    /// Next delay after `current`, doubled and capped.
    pub(crate) fn next_interval(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max_interval)
    }
}

/// Runs `future` unless `cancel` fires first.
pub(crate) async fn until_cancelled<T>(
    cancel: &CancellationToken,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AthenaError::Cancelled),
        result = future => result,
    }
}

/// Waits for one execution to reach a terminal state.
pub struct Poller<'a> {
    engine: &'a dyn QueryEngine,
    policy: PollPolicy,
}

impl<'a> Poller<'a> {
    pub fn new(engine: &'a dyn QueryEngine, policy: PollPolicy) -> Self {
        Self { engine, policy }
    }

    /// Polls until a terminal status, the deadline, or cancellation.
    ///
    /// Returns the terminal status, or the last non-terminal status once
    /// `deadline` has passed. Each status lookup is itself bounded by
    /// `deadline`. Transient lookup failures are retried within the retry
    /// budget; if the deadline passes before any status was observed the last
    /// transient error is returned. Any other error ends the loop at once.
    pub async fn await_terminal(
        &self,
        execution_id: &ExecutionId,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<ExecutionStatus> {
        let mut interval = self.policy.initial_interval;
        let mut last_seen: Option<ExecutionStatus> = None;
        let mut last_error: Option<AthenaError> = None;
        let mut consecutive_failures = 0u32;

        loop {
            let lookup = until_cancelled(cancel, async {
                Ok(tokio::time::timeout_at(deadline, self.engine.status(execution_id)).await)
            })
            .await?;
            let Ok(lookup) = lookup else {
                debug!(execution_id = %execution_id, "Status lookup outlived the wait deadline");
                return match last_seen {
                    Some(status) => Ok(status),
                    None => Err(AthenaError::transient(format!(
                        "status lookup for {execution_id} did not answer before the wait deadline"
                    ))),
                };
            };

            match lookup {
                Ok(status) if status.is_terminal() => {
                    debug!(execution_id = %execution_id, state = %status.state, "Query reached terminal state");
                    return Ok(status);
                }
                Ok(status) => {
                    consecutive_failures = 0;
                    if last_seen.as_ref().map(|s| s.state) != Some(status.state) {
                        debug!(execution_id = %execution_id, state = %status.state, "Query state observed");
                    }
                    last_seen = Some(status);
                }
                Err(e) if e.is_transient() => {
                    consecutive_failures += 1;
                    warn!(
                        execution_id = %execution_id,
                        attempt = consecutive_failures,
                        error = %e,
                        "Status lookup failed, will retry"
                    );
                    if consecutive_failures > self.policy.max_transient_retries {
                        return Err(e);
                    }
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(execution_id = %execution_id, "Wait deadline reached");
                return match last_seen {
                    Some(status) => Ok(status),
                    None => Err(last_error.unwrap_or_else(|| {
                        AthenaError::internal("Deadline reached before any status lookup")
                    })),
                };
            }

            let nap = interval.min(deadline - now);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AthenaError::Cancelled),
                _ = tokio::time::sleep(nap) => {}
            }
            interval = self.policy.next_interval(interval);
        }
    }
}
