//! Validated query requests.
//!
//! Limits are checked here, before anything reaches the engine. Out-of-range
//! values are rejected rather than clamped.

use std::time::Duration;

use crate::engine::SavedQuery;
use crate::error::{AthenaError, Result};

pub const DEFAULT_ROW_CAP: usize = 1000;
pub const MAX_ROW_CAP: usize = 10_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const MIN_TIMEOUT_MS: u64 = 1000;

/// Maximum number of rows returned for one execution, in `[1, 10000]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowCap(usize);

impl RowCap {
    /// Validates an optional caller-supplied `maxRows`.
    pub fn new(max_rows: Option<u64>) -> Result<Self> {
        let Some(value) = max_rows else {
            return Ok(Self::default());
        };
        match usize::try_from(value) {
            Ok(cap) if (1..=MAX_ROW_CAP).contains(&cap) => Ok(Self(cap)),
            _ => Err(AthenaError::invalid_input(format!(
                "maxRows must be between 1 and {MAX_ROW_CAP}, got {value}"
            ))),
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for RowCap {
    fn default() -> Self {
        Self(DEFAULT_ROW_CAP)
    }
}

/// How long a wait call may block before answering with a pending outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeout(Duration);

impl WaitTimeout {
    /// Validates an optional caller-supplied `timeoutMs`.
    pub fn new(timeout_ms: Option<u64>) -> Result<Self> {
        match timeout_ms {
            None => Ok(Self::default()),
            Some(ms) if ms >= MIN_TIMEOUT_MS => Ok(Self(Duration::from_millis(ms))),
            Some(ms) => Err(AthenaError::invalid_input(format!(
                "timeoutMs must be at least {MIN_TIMEOUT_MS}, got {ms}"
            ))),
        }
    }

    pub fn get(self) -> Duration {
        self.0
    }
}

impl Default for WaitTimeout {
    fn default() -> Self {
        Self(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

/// A SQL statement ready for submission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    database: String,
    sql: String,
    row_cap: RowCap,
    timeout: WaitTimeout,
}

impl QueryRequest {
    /// Builds a request, rejecting blank database names or SQL.
    pub fn new(
        database: impl Into<String>,
        sql: impl Into<String>,
        row_cap: RowCap,
        timeout: WaitTimeout,
    ) -> Result<Self> {
        let database = database.into();
        let sql = sql.into();

        if database.trim().is_empty() {
            return Err(AthenaError::invalid_input("database must not be empty"));
        }
        if sql.trim().is_empty() {
            return Err(AthenaError::invalid_input("query must not be empty"));
        }

        Ok(Self {
            database,
            sql,
            row_cap,
            timeout,
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn row_cap(&self) -> RowCap {
        self.row_cap
    }

    pub fn timeout(&self) -> WaitTimeout {
        self.timeout
    }
}

/// Points at a saved query, optionally running it against another database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedQueryRef {
    pub saved_query_id: String,
    pub database_override: Option<String>,
}

impl SavedQueryRef {
    pub fn new(saved_query_id: impl Into<String>, database_override: Option<String>) -> Self {
        Self {
            saved_query_id: saved_query_id.into(),
            database_override,
        }
    }

    /// Turns the stored statement into a request. No I/O happens here.
    pub fn resolve(
        &self,
        saved: SavedQuery,
        row_cap: RowCap,
        timeout: WaitTimeout,
    ) -> Result<QueryRequest> {
        let database = self.database_override.clone().unwrap_or(saved.database);
        QueryRequest::new(database, saved.sql, row_cap, timeout)
    }
}
