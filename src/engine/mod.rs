//! Remote query engine abstraction.
//!
//! Provides a trait-based interface over the engine that actually runs SQL,
//! so the orchestrator can be driven by AWS Athena in production and by a
//! scripted in-memory engine in tests.

mod athena;
mod mock;
mod types;

pub use athena::AthenaEngine;
pub use mock::{CallCounts, MockEngine, MockJob};
pub use types::{
    ExecutionId, ExecutionStatus, HeaderRow, QueryState, ResultPage, Row, SavedQuery,
    SavedQuerySummary,
};

use std::sync::Arc;

use crate::config::AthenaConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Supported engine backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineBackend {
    #[default]
    Athena,
    /// In-memory engine with demo data, for local experiments.
    Mock,
}

/// Creates the engine for the given backend and configuration.
pub async fn connect(backend: EngineBackend, config: &AthenaConfig) -> Result<Arc<dyn QueryEngine>> {
    match backend {
        EngineBackend::Athena => {
            let engine = AthenaEngine::connect(config).await?;
            Ok(Arc::new(engine))
        }
        EngineBackend::Mock => Ok(Arc::new(MockEngine::demo())),
    }
}

/// Capabilities consumed from the remote engine.
///
/// Implementations must be safe for concurrent independent calls. Execution
/// state lives entirely on the engine side.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    /// Starts executing `sql` against `database` and returns its identifier.
    async fn submit(&self, database: &str, sql: &str) -> Result<ExecutionId>;

    /// Looks up the current status of an execution.
    async fn status(&self, execution_id: &ExecutionId) -> Result<ExecutionStatus>;

    /// Fetches one page of results. `page_size` is an upper bound hint.
    async fn fetch_page(
        &self,
        execution_id: &ExecutionId,
        next_token: Option<&str>,
        page_size: usize,
    ) -> Result<ResultPage>;

    /// Resolves a saved query by identifier.
    async fn get_saved_query(&self, saved_query_id: &str) -> Result<SavedQuery>;

    /// Lists all saved queries.
    async fn list_saved_queries(&self) -> Result<Vec<SavedQuerySummary>>;

    /// Declares how the first page of results is laid out.
    fn header_row(&self) -> HeaderRow {
        HeaderRow::Absent
    }
}
