//! Value types exchanged with the remote query engine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle naming one remote query run.
///
/// Only compared and passed through; its format belongs to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionId(String);

impl ExecutionId {
    /// Wraps an engine-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ExecutionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ExecutionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Lifecycle state of a remote execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl QueryState {
    /// Returns true for SUCCEEDED, FAILED and CANCELLED.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    /// Returns the state as the engine spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time status of an execution, with the engine's diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStatus {
    pub state: QueryState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionStatus {
    /// Creates a status without a message.
    pub fn new(state: QueryState) -> Self {
        Self {
            state,
            message: None,
        }
    }

    /// Creates a status carrying the engine's state change reason.
    pub fn with_message(state: QueryState, message: impl Into<String>) -> Self {
        Self {
            state,
            message: Some(message.into()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// A result row. `None` is SQL NULL.
pub type Row = Vec<Option<String>>;

/// One page of results as returned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultPage {
    /// Column labels from the result set metadata.
    pub columns: Vec<String>,
    /// Rows in this page, possibly starting with a header row (see [`HeaderRow`]).
    pub rows: Vec<Row>,
    /// Continuation token for the next page, if any.
    pub next_token: Option<String>,
}

/// Whether an engine prepends column labels as the first row of the first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderRow {
    /// Pages contain only data rows.
    #[default]
    Absent,
    /// The first row of the first page is dropped when its values equal the
    /// column labels.
    MatchesColumns,
}

/// A pre-registered SQL statement, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedQuery {
    pub id: String,
    pub name: String,
    pub database: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Listing entry for a saved query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedQuerySummary {
    pub id: String,
    pub name: String,
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&SavedQuery> for SavedQuerySummary {
    fn from(query: &SavedQuery) -> Self {
        Self {
            id: query.id.clone(),
            name: query.name.clone(),
            database: query.database.clone(),
            description: query.description.clone(),
        }
    }
}
