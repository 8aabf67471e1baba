//! Integration tests for aws-athena-mcp.

pub mod athena_test;
pub mod config_test;
pub mod properties_test;
pub mod tools_test;
