//! Query execution for the Athena MCP server.
//!
//! This module isolates submission, status polling and result pagination
//! from the tool protocol layer.

pub mod fetcher;
pub mod orchestrator;
pub mod outcome;
pub mod poller;
pub mod request;

pub use fetcher::{FetchedRows, ResultFetcher};
pub use orchestrator::Orchestrator;
pub use outcome::{CompletedQuery, FailedQuery, Outcome, PendingQuery};
pub use poller::{PollPolicy, Poller};
pub use request::{QueryRequest, RowCap, SavedQueryRef, WaitTimeout};
