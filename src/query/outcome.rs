//! Result envelopes returned to tool callers.

use serde::Serialize;

use crate::engine::{ExecutionId, ExecutionStatus, QueryState, Row};

/// What a wait or result call produced. Always exactly one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Completed(CompletedQuery),
    Pending(PendingQuery),
    Failed(FailedQuery),
}

/// Rows of a SUCCEEDED execution, capped at the caller's row limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedQuery {
    #[serde(rename = "queryExecutionId")]
    pub execution_id: ExecutionId,
    pub status: QueryState,
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
    pub truncated: bool,
}

/// An execution still QUEUED or RUNNING when the wait ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingQuery {
    #[serde(rename = "queryExecutionId")]
    pub execution_id: ExecutionId,
    pub status: QueryState,
}

/// An execution the engine reported as FAILED or CANCELLED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedQuery {
    #[serde(rename = "queryExecutionId")]
    pub execution_id: ExecutionId,
    pub status: QueryState,
    pub message: String,
}

impl Outcome {
    pub(crate) fn completed(
        execution_id: ExecutionId,
        columns: Vec<String>,
        rows: Vec<Row>,
        truncated: bool,
    ) -> Self {
        Self::Completed(CompletedQuery {
            execution_id,
            status: QueryState::Succeeded,
            columns,
            row_count: rows.len(),
            rows,
            truncated,
        })
    }

    pub(crate) fn pending(execution_id: ExecutionId, status: QueryState) -> Self {
        Self::Pending(PendingQuery {
            execution_id,
            status,
        })
    }

    /// Passes the engine's message through verbatim when there is one.
    pub(crate) fn failed(execution_id: ExecutionId, status: ExecutionStatus) -> Self {
        let message = status
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Query {} without a reason from Athena", status.state));
        Self::Failed(FailedQuery {
            execution_id,
            status: status.state,
            message,
        })
    }

    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            Self::Completed(q) => &q.execution_id,
            Self::Pending(q) => &q.execution_id,
            Self::Failed(q) => &q.execution_id,
        }
    }

    pub fn status(&self) -> QueryState {
        match self {
            Self::Completed(q) => q.status,
            Self::Pending(q) => q.status,
            Self::Failed(q) => q.status,
        }
    }
}
