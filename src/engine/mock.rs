//! Mock query engine for testing.
//!
//! Provides an in-memory engine whose executions move through QUEUED,
//! RUNNING and a scripted terminal state on tokio's clock, so tests can use
//! a paused runtime to exercise deadlines deterministically.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{
    ExecutionId, ExecutionStatus, HeaderRow, QueryEngine, QueryState, ResultPage, Row,
    SavedQuery, SavedQuerySummary,
};
use crate::error::{AthenaError, Result};

/// Largest page the mock returns, matching Athena's `MaxResults` ceiling.
const MAX_PAGE_SIZE: usize = 1000;

/// Scripted behaviour for executions whose SQL matches a pattern.
#[derive(Debug, Clone)]
pub struct MockJob {
    queued_for: Duration,
    run_for: Duration,
    result: MockResult,
}

#[derive(Debug, Clone)]
enum MockResult {
    Rows { columns: Vec<String>, rows: Vec<Row> },
    Failed(String),
    Cancelled(Option<String>),
}

impl MockJob {
    /// A job that succeeds with the given columns and rows.
    pub fn rows(columns: &[&str], rows: Vec<Row>) -> Self {
        Self::finishing_with(MockResult::Rows {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        })
    }

    /// A job that succeeds with `count` generated rows of `(id, label)`.
    pub fn generated(count: usize) -> Self {
        let rows = (0..count)
            .map(|i| vec![Some(i.to_string()), Some(format!("row-{i}"))])
            .collect();
        Self::rows(&["id", "label"], rows)
    }

    /// A job that fails with the given diagnostic message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::finishing_with(MockResult::Failed(message.into()))
    }

    /// A job that ends up cancelled on the engine side.
    pub fn cancelled() -> Self {
        Self::finishing_with(MockResult::Cancelled(None))
    }

    /// Keeps the job QUEUED for `duration` after submission.
    pub fn queued_for(mut self, duration: Duration) -> Self {
        self.queued_for = duration;
        self
    }

    /// Keeps the job RUNNING for `duration` after it leaves the queue.
    pub fn running_for(mut self, duration: Duration) -> Self {
        self.run_for = duration;
        self
    }

    fn finishing_with(result: MockResult) -> Self {
        Self {
            queued_for: Duration::ZERO,
            run_for: Duration::ZERO,
            result,
        }
    }
}

/// Number of calls made against each engine capability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub submit: usize,
    pub status: usize,
    pub fetch_page: usize,
    pub get_saved_query: usize,
    pub list_saved_queries: usize,
}

impl CallCounts {
    /// Total number of remote calls.
    pub fn total(&self) -> usize {
        self.submit
            + self.status
            + self.fetch_page
            + self.get_saved_query
            + self.list_saved_queries
    }
}

#[derive(Debug)]
struct Execution {
    job: MockJob,
    submitted_at: Instant,
}

impl Execution {
    fn status(&self, now: Instant) -> ExecutionStatus {
        let elapsed = now.saturating_duration_since(self.submitted_at);
        if elapsed < self.job.queued_for {
            return ExecutionStatus::new(QueryState::Queued);
        }
        if elapsed < self.job.queued_for + self.job.run_for {
            return ExecutionStatus::new(QueryState::Running);
        }
        match &self.job.result {
            MockResult::Rows { .. } => ExecutionStatus::new(QueryState::Succeeded),
            MockResult::Failed(message) => {
                ExecutionStatus::with_message(QueryState::Failed, message.clone())
            }
            MockResult::Cancelled(Some(reason)) => {
                ExecutionStatus::with_message(QueryState::Cancelled, reason.clone())
            }
            MockResult::Cancelled(None) => ExecutionStatus::new(QueryState::Cancelled),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    jobs: Vec<(String, MockJob)>,
    executions: HashMap<ExecutionId, Execution>,
    saved_queries: Vec<SavedQuery>,
    submitted: Vec<(String, String)>,
    next_id: u64,
    failing_status_calls: u32,
    failing_page_calls: u32,
    calls: CallCounts,
}

/// A mock engine that runs scripted jobs in memory.
#[derive(Debug)]
pub struct MockEngine {
    state: Mutex<MockState>,
    default_job: MockJob,
    header_row: HeaderRow,
}

impl MockEngine {
    /// Creates a mock engine where every query succeeds at once with one row.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            default_job: MockJob::rows(&["_col0"], vec![vec![Some("1".to_string())]]),
            header_row: HeaderRow::Absent,
        }
    }

    /// Creates a mock engine seeded with sample saved queries and jobs.
    pub fn demo() -> Self {
        Self::new()
            .with_header_row()
            .with_job(
                "daily_active_users",
                MockJob::rows(
                    &["day", "users"],
                    vec![
                        vec![Some("2024-06-01".to_string()), Some("1204".to_string())],
                        vec![Some("2024-06-02".to_string()), Some("1177".to_string())],
                    ],
                )
                .running_for(Duration::from_secs(2)),
            )
            .with_job("slow_scan", MockJob::generated(10).running_for(Duration::from_secs(90)))
            .with_job(
                "syntax_error",
                MockJob::failed("line 1:8: mismatched input 'FORM'. Expecting: <expression>"),
            )
            .with_saved_query(SavedQuery {
                id: "demo-dau".to_string(),
                name: "Daily active users".to_string(),
                database: "analytics".to_string(),
                sql: "SELECT day, users FROM daily_active_users ORDER BY day".to_string(),
                description: Some("Distinct users per day".to_string()),
            })
    }

    /// Routes SQL containing `pattern` (case-insensitive) to `job`.
    pub fn with_job(self, pattern: impl Into<String>, job: MockJob) -> Self {
        self.lock()
            .jobs
            .push((pattern.into().to_lowercase(), job));
        self
    }

    /// Registers a saved query.
    pub fn with_saved_query(self, query: SavedQuery) -> Self {
        self.lock().saved_queries.push(query);
        self
    }

    /// Prepends a column-label row to the first page, the way Athena does.
    pub fn with_header_row(mut self) -> Self {
        self.header_row = HeaderRow::MatchesColumns;
        self
    }

    /// Makes the next `count` status lookups fail with a transient error.
    pub fn fail_next_status_calls(&self, count: u32) {
        self.lock().failing_status_calls = count;
    }

    /// Makes the next `count` page fetches fail with a transient error.
    pub fn fail_next_page_calls(&self, count: u32) {
        self.lock().failing_page_calls = count;
    }

    /// Cancels a running execution on the engine side, as an operator would.
    pub fn cancel_execution(&self, execution_id: &ExecutionId, reason: impl Into<String>) {
        let now = Instant::now();
        let mut state = self.lock();
        if let Some(execution) = state.executions.get_mut(execution_id) {
            let elapsed = now.saturating_duration_since(execution.submitted_at);
            execution.job.queued_for = execution.job.queued_for.min(elapsed);
            execution.job.run_for = elapsed.saturating_sub(execution.job.queued_for);
            execution.job.result = MockResult::Cancelled(Some(reason.into()));
        }
    }

    /// Returns the number of calls made so far.
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    /// Returns every `(database, sql)` pair submitted so far.
    pub fn submitted(&self) -> Vec<(String, String)> {
        self.lock().submitted.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn job_for(&self, jobs: &[(String, MockJob)], sql: &str) -> MockJob {
        let sql = sql.to_lowercase();
        jobs.iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, job)| job.clone())
            .unwrap_or_else(|| self.default_job.clone())
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_execution(execution_id: &ExecutionId) -> AthenaError {
    AthenaError::not_found(format!("QueryExecution {execution_id} was not found"))
}

#[async_trait]
impl QueryEngine for MockEngine {
    async fn submit(&self, database: &str, sql: &str) -> Result<ExecutionId> {
        let mut state = self.lock();
        state.calls.submit += 1;

        let job = self.job_for(&state.jobs, sql);
        state.next_id += 1;
        let execution_id = ExecutionId::new(format!("mock-{:08}", state.next_id));
        state.executions.insert(
            execution_id.clone(),
            Execution {
                job,
                submitted_at: Instant::now(),
            },
        );
        state.submitted.push((database.to_string(), sql.to_string()));
        Ok(execution_id)
    }

    async fn status(&self, execution_id: &ExecutionId) -> Result<ExecutionStatus> {
        let mut state = self.lock();
        state.calls.status += 1;

        if state.failing_status_calls > 0 {
            state.failing_status_calls -= 1;
            return Err(AthenaError::transient("Rate exceeded"));
        }

        state
            .executions
            .get(execution_id)
            .map(|execution| execution.status(Instant::now()))
            .ok_or_else(|| unknown_execution(execution_id))
    }

    async fn fetch_page(
        &self,
        execution_id: &ExecutionId,
        next_token: Option<&str>,
        page_size: usize,
    ) -> Result<ResultPage> {
        let mut state = self.lock();
        state.calls.fetch_page += 1;

        if state.failing_page_calls > 0 {
            state.failing_page_calls -= 1;
            return Err(AthenaError::transient("Rate exceeded"));
        }

        let execution = state
            .executions
            .get(execution_id)
            .ok_or_else(|| unknown_execution(execution_id))?;

        let status = execution.status(Instant::now());
        let (columns, data) = match (&execution.job.result, status.state) {
            (MockResult::Rows { columns, rows }, QueryState::Succeeded) => (columns, rows),
            _ => {
                return Err(AthenaError::remote(format!(
                    "Query has not yet finished. Current state: {}",
                    status.state
                )))
            }
        };

        let header = match self.header_row {
            HeaderRow::MatchesColumns => Some(columns.iter().cloned().map(Some).collect::<Row>()),
            HeaderRow::Absent => None,
        };
        let total = data.len() + usize::from(header.is_some());

        let offset = match next_token {
            Some(token) => token
                .parse::<usize>()
                .ok()
                .filter(|offset| *offset <= total)
                .ok_or_else(|| AthenaError::remote(format!("Invalid pagination token: {token}")))?,
            None => 0,
        };
        let end = (offset + page_size.clamp(1, MAX_PAGE_SIZE)).min(total);

        let rows = (offset..end)
            .map(|index| match (&header, index) {
                (Some(header), 0) => header.clone(),
                (Some(_), index) => data[index - 1].clone(),
                (None, index) => data[index].clone(),
            })
            .collect();

        Ok(ResultPage {
            columns: columns.clone(),
            rows,
            next_token: (end < total).then(|| end.to_string()),
        })
    }

    async fn get_saved_query(&self, saved_query_id: &str) -> Result<SavedQuery> {
        let mut state = self.lock();
        state.calls.get_saved_query += 1;

        state
            .saved_queries
            .iter()
            .find(|query| query.id == saved_query_id)
            .cloned()
            .ok_or_else(|| {
                AthenaError::not_found(format!("NamedQuery {saved_query_id} was not found"))
            })
    }

    async fn list_saved_queries(&self) -> Result<Vec<SavedQuerySummary>> {
        let mut state = self.lock();
        state.calls.list_saved_queries += 1;
        Ok(state.saved_queries.iter().map(SavedQuerySummary::from).collect())
    }

    fn header_row(&self) -> HeaderRow {
        self.header_row
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_job_moves_through_states() {
        let engine = MockEngine::new().with_job(
            "slow",
            MockJob::generated(3)
                .queued_for(Duration::from_secs(1))
                .running_for(Duration::from_secs(2)),
        );
        let id = engine.submit("db", "SELECT * FROM slow").await.unwrap();

        assert_eq!(engine.status(&id).await.unwrap().state, QueryState::Queued);
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(engine.status(&id).await.unwrap().state, QueryState::Running);
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(engine.status(&id).await.unwrap().state, QueryState::Succeeded);
    }

    #[tokio::test]
    async fn test_unknown_execution_is_not_found() {
        let engine = MockEngine::new();
        let err = engine.status(&ExecutionId::from("nope")).await.unwrap_err();
        assert!(matches!(err, AthenaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_pages_follow_tokens() {
        let engine = MockEngine::new().with_job("big", MockJob::generated(5));
        let id = engine.submit("db", "SELECT big").await.unwrap();

        let first = engine.fetch_page(&id, None, 3).await.unwrap();
        assert_eq!(first.rows.len(), 3);
        let token = first.next_token.expect("more rows");

        let second = engine.fetch_page(&id, Some(&token), 3).await.unwrap();
        assert_eq!(second.rows.len(), 2);
        assert_eq!(second.next_token, None);
        assert_eq!(second.rows[0][0].as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_header_row_is_prepended() {
        let engine = MockEngine::new()
            .with_header_row()
            .with_job("big", MockJob::generated(2));
        let id = engine.submit("db", "SELECT big").await.unwrap();

        let page = engine.fetch_page(&id, None, 10).await.unwrap();
        assert_eq!(page.rows.len(), 3);
        assert_eq!(page.rows[0], vec![Some("id".to_string()), Some("label".to_string())]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_consumed() {
        let engine = MockEngine::new();
        let id = engine.submit("db", "SELECT 1").await.unwrap();
        engine.fail_next_status_calls(1);

        assert!(engine.status(&id).await.unwrap_err().is_transient());
        assert!(engine.status(&id).await.is_ok());
        assert_eq!(engine.calls().status, 2);
    }

    #[tokio::test]
    async fn test_fetch_before_success_is_rejected() {
        let engine = MockEngine::new().with_job("bad", MockJob::failed("boom"));
        let id = engine.submit("db", "SELECT bad").await.unwrap();
        let err = engine.fetch_page(&id, None, 10).await.unwrap_err();
        assert!(matches!(err, AthenaError::Remote(_)));
    }
}
