//! Integration tests for aws-athena-mcp.
//!
//! Most tests run against the in-memory engine. The live Athena tests are
//! skipped unless ATHENA_TEST_DATABASE is set, with AWS credentials, region
//! and ATHENA_OUTPUT_LOCATION (or a workgroup with one) in the environment.
//!
//! Run with: `cargo test --test integration_tests`

mod integration;
