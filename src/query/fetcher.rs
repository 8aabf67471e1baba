//! Result pagination up to a row cap.
//!
//! Each request asks for one row more than the cap still allows, so
//! truncation is decided from rows the engine actually returned rather than
//! from the presence of a continuation token.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::poller::{until_cancelled, PollPolicy};
use super::request::RowCap;
use crate::engine::{ExecutionId, ExecutionStatus, HeaderRow, QueryEngine, QueryState, ResultPage, Row};
use crate::error::{AthenaError, Result};

/// Largest page requested from the engine.
const MAX_PAGE_SIZE: usize = 1000;

/// Rows collected for one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    /// True exactly when the engine had more rows than were kept.
    pub truncated: bool,
}

/// Collects result pages for a SUCCEEDED execution.
pub struct ResultFetcher<'a> {
    engine: &'a dyn QueryEngine,
    policy: PollPolicy,
}

fn is_header(row: &Row, columns: &[String]) -> bool {
    !columns.is_empty()
        && row.len() == columns.len()
        && row
            .iter()
            .zip(columns)
            .all(|(value, column)| value.as_deref() == Some(column.as_str()))
}

impl<'a> ResultFetcher<'a> {
    pub fn new(engine: &'a dyn QueryEngine, policy: PollPolicy) -> Self {
        Self { engine, policy }
    }

    /// Fetches up to `row_cap` rows.
    ///
    /// `status` must be the SUCCEEDED status just observed for `execution_id`;
    /// anything else is refused without contacting the engine.
    pub async fn fetch_rows(
        &self,
        execution_id: &ExecutionId,
        status: &ExecutionStatus,
        row_cap: RowCap,
        cancel: &CancellationToken,
    ) -> Result<FetchedRows> {
        if status.state != QueryState::Succeeded {
            return Err(AthenaError::internal(format!(
                "Refusing to fetch results for {execution_id} in state {}",
                status.state
            )));
        }

        let cap = row_cap.get();
        let strip_header = self.engine.header_row() == HeaderRow::MatchesColumns;
        let mut columns = Vec::new();
        let mut rows: Vec<Row> = Vec::with_capacity(cap.min(MAX_PAGE_SIZE));
        let mut token: Option<String> = None;
        let mut first_page = true;
        let mut pages = 0usize;

        loop {
            let remaining = cap - rows.len();
            let header_slot = usize::from(first_page && strip_header);
            let page_size = (remaining + 1 + header_slot).min(MAX_PAGE_SIZE);

            let page = self
                .fetch_page(execution_id, token.as_deref(), page_size, cancel)
                .await?;
            pages += 1;

            let mut page_rows = page.rows;
            if first_page {
                columns = page.columns;
                if header_slot == 1 && page_rows.first().is_some_and(|row| is_header(row, &columns)) {
                    page_rows.remove(0);
                }
                first_page = false;
            }

            if page_rows.len() > remaining {
                page_rows.truncate(remaining);
                rows.extend(page_rows);
                debug!(execution_id = %execution_id, rows = rows.len(), pages, "Result truncated at row cap");
                return Ok(FetchedRows {
                    columns,
                    rows,
                    truncated: true,
                });
            }
            rows.extend(page_rows);

            match page.next_token {
                Some(next) if token.as_deref() == Some(next.as_str()) => {
                    warn!(execution_id = %execution_id, "Engine repeated a continuation token");
                    break;
                }
                Some(next) => token = Some(next),
                None => break,
            }
        }

        debug!(execution_id = %execution_id, rows = rows.len(), pages, "Fetched all result rows");
        Ok(FetchedRows {
            columns,
            rows,
            truncated: false,
        })
    }

    /// Fetches one page, retrying transient failures with backoff.
    async fn fetch_page(
        &self,
        execution_id: &ExecutionId,
        token: Option<&str>,
        page_size: usize,
        cancel: &CancellationToken,
    ) -> Result<ResultPage> {
        let mut delay = self.policy.initial_interval;
        let mut attempt = 0u32;

        loop {
            match until_cancelled(cancel, self.engine.fetch_page(execution_id, token, page_size)).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.policy.max_transient_retries => {
                    attempt += 1;
                    warn!(execution_id = %execution_id, attempt, error = %e, "Result page fetch failed, will retry");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AthenaError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    delay = self.policy.next_interval(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}
