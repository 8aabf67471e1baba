//! Live Athena tests.
//!
//! Skipped unless ATHENA_TEST_DATABASE names a database the caller can query.

use aws_athena_mcp::config::AthenaConfig;
use aws_athena_mcp::engine::{AthenaEngine, QueryEngine, QueryState};
use aws_athena_mcp::error::AthenaError;
use aws_athena_mcp::query::{Orchestrator, Outcome, PollPolicy, QueryRequest, RowCap, WaitTimeout};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Helper to get the test database from environment.
fn get_test_database() -> Option<String> {
    std::env::var("ATHENA_TEST_DATABASE").ok()
}

/// Helper to create a live engine.
async fn get_test_engine() -> Option<(AthenaEngine, String)> {
    let database = get_test_database()?;
    let mut config = AthenaConfig::default();
    config.apply_env_defaults();
    let engine = AthenaEngine::connect(&config).await.ok()?;
    Some((engine, database))
}

#[tokio::test]
async fn test_select_literal() {
    let Some((engine, database)) = get_test_engine().await else {
        eprintln!("Skipping test: ATHENA_TEST_DATABASE not set");
        return;
    };

    let orchestrator = Orchestrator::new(Arc::new(engine), PollPolicy::default());
    let request = QueryRequest::new(
        database,
        "SELECT 1 AS num, 'hello' AS greeting",
        RowCap::default(),
        WaitTimeout::new(Some(120_000)).unwrap(),
    )
    .unwrap();

    let outcome = orchestrator
        .submit_and_wait(request, &CancellationToken::new())
        .await
        .unwrap();

    let Outcome::Completed(completed) = outcome else {
        panic!("expected Completed, got {outcome:?}");
    };
    assert_eq!(completed.columns, vec!["num", "greeting"]);
    assert_eq!(completed.row_count, 1);
    assert_eq!(completed.rows[0], vec![Some("1".to_string()), Some("hello".to_string())]);
}

#[tokio::test]
async fn test_truncation_against_sequence() {
    let Some((engine, database)) = get_test_engine().await else {
        eprintln!("Skipping test: ATHENA_TEST_DATABASE not set");
        return;
    };

    let orchestrator = Orchestrator::new(Arc::new(engine), PollPolicy::default());
    let request = QueryRequest::new(
        database,
        "SELECT x FROM UNNEST(sequence(1, 2500)) AS t(x)",
        RowCap::new(Some(2000)).unwrap(),
        WaitTimeout::new(Some(120_000)).unwrap(),
    )
    .unwrap();

    let outcome = orchestrator
        .submit_and_wait(request, &CancellationToken::new())
        .await
        .unwrap();

    let Outcome::Completed(completed) = outcome else {
        panic!("expected Completed, got {outcome:?}");
    };
    assert_eq!(completed.rows.len(), 2000);
    assert!(completed.truncated);
}

#[tokio::test]
async fn test_invalid_sql_fails_remotely() {
    let Some((engine, database)) = get_test_engine().await else {
        eprintln!("Skipping test: ATHENA_TEST_DATABASE not set");
        return;
    };

    let id = match engine.submit(&database, "SELECT * FORM nowhere").await {
        Ok(id) => id,
        // Syntax rejected at submission surfaces as a non-retryable remote error.
        Err(e) => {
            assert!(matches!(e, AthenaError::Remote(_)), "unexpected error: {e:?}");
            return;
        }
    };

    let orchestrator = Orchestrator::new(Arc::new(engine), PollPolicy::default());
    let mut status = orchestrator.get_status(&id).await.unwrap();
    while !status.is_terminal() {
        tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        status = orchestrator.get_status(&id).await.unwrap();
    }
    assert_eq!(status.state, QueryState::Failed);
    assert!(status.message.is_some());
}
