//! aws-athena-mcp: runs SQL against AWS Athena on behalf of MCP clients.
//!
//! This library exposes the core modules for the binary and for integration tests.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod query;
