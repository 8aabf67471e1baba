//! Error types for the Athena MCP server.
//!
//! Defines the main error enum used throughout the application.

use thiserror::Error;

/// Main error type for Athena MCP operations.
///
/// A remote execution that ends in FAILED or CANCELLED is not an error; it is
/// reported as [`crate::query::Outcome::Failed`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AthenaError {
    /// Malformed or out-of-range tool arguments. Raised before any remote call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown execution identifier or saved query identifier.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Results were requested for an execution that has not finished yet.
    #[error("Query is still running: {0}")]
    StillRunning(String),

    /// Connectivity or throttling errors that outlasted the retry budget.
    #[error("Athena temporarily unavailable: {0}")]
    RemoteTransient(String),

    /// Non-retryable errors reported by the remote engine.
    #[error("Athena error: {0}")]
    Remote(String),

    /// The caller aborted the request before it finished.
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration errors (invalid config file, bad output location, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport errors (malformed JSON-RPC, broken pipes, bind failures).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AthenaError {
    /// Creates an invalid input error with the given message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Creates a not found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Creates a still running error for the given execution.
    pub fn still_running(msg: impl Into<String>) -> Self {
        Self::StillRunning(msg.into())
    }

    /// Creates a transient remote error with the given message.
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::RemoteTransient(msg.into())
    }

    /// Creates a non-retryable remote error with the given message.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a transport error with the given message.
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if the operation may succeed when retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RemoteTransient(_))
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "Invalid Input",
            Self::NotFound(_) => "Not Found",
            Self::StillRunning(_) => "Still Running",
            Self::RemoteTransient(_) => "Remote Transient Error",
            Self::Remote(_) => "Remote Error",
            Self::Cancelled => "Cancelled",
            Self::Config(_) => "Configuration Error",
            Self::Transport(_) => "Transport Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using AthenaError.
pub type Result<T> = std::result::Result<T, AthenaError>;
