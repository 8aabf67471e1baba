//! Query execution orchestration.
//!
//! Bridges a single tool call onto an asynchronous Athena execution:
//! submit, poll until terminal or deadline, then fetch rows. The execution id
//! is the only state that outlives a call; nothing is cached here.

use std::sync::Arc;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::fetcher::ResultFetcher;
use super::outcome::Outcome;
use super::poller::{PollPolicy, Poller};
use super::request::{QueryRequest, RowCap, SavedQueryRef, WaitTimeout};
use crate::engine::{ExecutionId, ExecutionStatus, QueryEngine, QueryState, SavedQuerySummary};
use crate::error::{AthenaError, Result};

/// Runs queries against a shared engine. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<dyn QueryEngine>,
    policy: PollPolicy,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn QueryEngine>, policy: PollPolicy) -> Self {
        Self { engine, policy }
    }

    /// Submits a query and waits for it up to the request's timeout.
    ///
    /// A timeout yields [`Outcome::Pending`]; the execution keeps running and
    /// can be picked up later with [`Self::get_status`] or [`Self::get_results`].
    pub async fn submit_and_wait(
        &self,
        request: QueryRequest,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let deadline = Instant::now() + request.timeout().get();

        let execution_id = self.engine.submit(request.database(), request.sql()).await?;
        info!(
            execution_id = %execution_id,
            database = request.database(),
            timeout_ms = request.timeout().get().as_millis() as u64,
            "Query submitted"
        );

        let status = Poller::new(self.engine.as_ref(), self.policy)
            .await_terminal(&execution_id, deadline, cancel)
            .await?;

        if !status.is_terminal() {
            info!(execution_id = %execution_id, state = %status.state, "Wait timed out, query still in progress");
        }

        self.settle(execution_id, status, request.row_cap(), cancel).await
    }

    /// Resolves a saved query and runs it like [`Self::submit_and_wait`].
    ///
    /// Unknown ids fail with `NotFound` before anything is submitted.
    pub async fn submit_saved_and_wait(
        &self,
        reference: &SavedQueryRef,
        row_cap: RowCap,
        timeout: WaitTimeout,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let saved = self.engine.get_saved_query(&reference.saved_query_id).await?;
        info!(saved_query_id = %reference.saved_query_id, name = %saved.name, "Resolved saved query");

        let request = reference.resolve(saved, row_cap, timeout)?;
        self.submit_and_wait(request, cancel).await
    }

    /// Single status lookup, no polling.
    pub async fn get_status(&self, execution_id: &ExecutionId) -> Result<ExecutionStatus> {
        self.engine.status(execution_id).await
    }

    /// Returns results of a finished execution without waiting.
    ///
    /// Executions still QUEUED or RUNNING fail with `StillRunning` and no
    /// rows are fetched.
    pub async fn get_results(
        &self,
        execution_id: &ExecutionId,
        row_cap: RowCap,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let status = self.engine.status(execution_id).await?;
        if !status.is_terminal() {
            return Err(AthenaError::still_running(format!(
                "execution {execution_id} is {}. Use get_status to check progress",
                status.state
            )));
        }
        self.settle(execution_id.clone(), status, row_cap, cancel).await
    }

    /// Lists saved queries straight from the engine.
    pub async fn list_saved_queries(&self) -> Result<Vec<SavedQuerySummary>> {
        self.engine.list_saved_queries().await
    }

    /// Turns an observed status into an outcome, fetching rows on success.
    async fn settle(
        &self,
        execution_id: ExecutionId,
        status: ExecutionStatus,
        row_cap: RowCap,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        match status.state {
            QueryState::Succeeded => {
                let fetched = ResultFetcher::new(self.engine.as_ref(), self.policy)
                    .fetch_rows(&execution_id, &status, row_cap, cancel)
                    .await?;
                info!(
                    execution_id = %execution_id,
                    rows = fetched.rows.len(),
                    truncated = fetched.truncated,
                    "Query completed"
                );
                Ok(Outcome::completed(
                    execution_id,
                    fetched.columns,
                    fetched.rows,
                    fetched.truncated,
                ))
            }
            QueryState::Failed | QueryState::Cancelled => {
                info!(
                    execution_id = %execution_id,
                    state = %status.state,
                    reason = status.message.as_deref().unwrap_or(""),
                    "Query did not succeed"
                );
                Ok(Outcome::failed(execution_id, status))
            }
            QueryState::Queued | QueryState::Running => {
                Ok(Outcome::pending(execution_id, status.state))
            }
        }
    }
}
