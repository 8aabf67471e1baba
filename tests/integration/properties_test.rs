//! End-to-end orchestrator behaviour against the in-memory engine.
//!
//! Time is paused, so multi-second waits run instantly.

use std::sync::Arc;
use std::time::Duration;

use aws_athena_mcp::engine::{MockEngine, MockJob, QueryEngine, QueryState};
use aws_athena_mcp::error::AthenaError;
use aws_athena_mcp::query::{
    Orchestrator, Outcome, PollPolicy, QueryRequest, RowCap, SavedQueryRef, WaitTimeout,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

fn orchestrator(engine: &Arc<MockEngine>) -> Orchestrator {
    Orchestrator::new(engine.clone(), PollPolicy::default())
}

fn request(sql: &str, max_rows: Option<u64>, timeout_ms: Option<u64>) -> QueryRequest {
    QueryRequest::new(
        "analytics",
        sql,
        RowCap::new(max_rows).unwrap(),
        WaitTimeout::new(timeout_ms).unwrap(),
    )
    .unwrap()
}

async fn run(engine: &Arc<MockEngine>, request: QueryRequest) -> Outcome {
    orchestrator(engine)
        .submit_and_wait(request, &CancellationToken::new())
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_small_result_is_complete() {
    let engine = Arc::new(MockEngine::new().with_job("events", MockJob::generated(5)));

    let Outcome::Completed(completed) = run(&engine, request("SELECT * FROM events", Some(1000), None)).await
    else {
        panic!("expected Completed");
    };

    assert_eq!(completed.row_count, 5);
    assert_eq!(completed.rows.len(), 5);
    assert!(!completed.truncated);
}

#[tokio::test(start_paused = true)]
async fn test_large_result_is_truncated_at_cap() {
    let engine = Arc::new(MockEngine::new().with_job("clicks", MockJob::generated(50_000)));

    let Outcome::Completed(completed) = run(&engine, request("SELECT * FROM clicks", Some(1000), None)).await
    else {
        panic!("expected Completed");
    };

    assert_eq!(completed.rows.len(), 1000);
    assert_eq!(completed.row_count, 1000);
    assert!(completed.truncated);
    assert_eq!(completed.rows[999][0].as_deref(), Some("999"));
    // Pages hold at most 1000 rows, so a one-row follow-up page is needed to
    // see the overflow.
    assert_eq!(engine.calls().fetch_page, 2);
}

#[tokio::test(start_paused = true)]
async fn test_rows_never_exceed_cap_and_truncation_is_exact() {
    let cases = [(0, 1), (1, 1), (2, 1), (999, 1000), (1000, 1000), (1001, 1000), (3000, 2500), (10_000, 10_000)];

    for (available, cap) in cases {
        let engine = Arc::new(MockEngine::new().with_job("t", MockJob::generated(available)));
        let outcome = run(&engine, request("SELECT t", Some(cap as u64), None)).await;

        let Outcome::Completed(completed) = outcome else {
            panic!("expected Completed for {available} rows, cap {cap}");
        };
        assert!(completed.rows.len() <= cap, "{available} rows, cap {cap}");
        assert_eq!(completed.rows.len(), available.min(cap), "{available} rows, cap {cap}");
        assert_eq!(completed.truncated, available > cap, "{available} rows, cap {cap}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_header_row_never_counts_against_cap() {
    let engine = Arc::new(
        MockEngine::new()
            .with_header_row()
            .with_job("t", MockJob::generated(1000)),
    );

    let Outcome::Completed(completed) = run(&engine, request("SELECT t", Some(1000), None)).await else {
        panic!("expected Completed");
    };
    assert_eq!(completed.rows.len(), 1000);
    assert!(!completed.truncated);
    assert_eq!(completed.rows[0][0].as_deref(), Some("0"));
}

#[tokio::test(start_paused = true)]
async fn test_timeout_yields_resumable_pending() {
    let engine = Arc::new(
        MockEngine::new().with_job("slow", MockJob::generated(3).running_for(Duration::from_millis(5000))),
    );
    let orchestrator = orchestrator(&engine);
    let started = tokio::time::Instant::now();

    let outcome = orchestrator
        .submit_and_wait(request("SELECT slow", None, Some(1000)), &CancellationToken::new())
        .await
        .unwrap();
    let Outcome::Pending(pending) = outcome else {
        panic!("expected Pending");
    };
    assert!(started.elapsed() < Duration::from_millis(1100));

    let early = orchestrator
        .get_results(&pending.execution_id, RowCap::default(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(early, AthenaError::StillRunning(_)));

    tokio::time::sleep_until(started + Duration::from_millis(5000)).await;

    let status = orchestrator.get_status(&pending.execution_id).await.unwrap();
    assert_eq!(status.state, QueryState::Succeeded);

    let outcome = orchestrator
        .get_results(&pending.execution_id, RowCap::default(), &CancellationToken::new())
        .await
        .unwrap();
    let Outcome::Completed(completed) = outcome else {
        panic!("expected Completed");
    };
    assert_eq!(completed.execution_id, pending.execution_id);
    assert_eq!(completed.row_count, 3);
    assert_eq!(engine.calls().submit, 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_sql_is_failed_outcome() {
    let engine = Arc::new(MockEngine::demo());

    let outcome = run(&engine, request("SELECT * FROM syntax_error", None, None)).await;
    let Outcome::Failed(failed) = outcome else {
        panic!("expected Failed");
    };
    assert_eq!(failed.status, QueryState::Failed);
    assert!(!failed.message.is_empty());
    assert_eq!(engine.calls().fetch_page, 0);
}

#[tokio::test]
async fn test_get_results_on_running_fetches_nothing() {
    let engine = Arc::new(
        MockEngine::new().with_job("slow", MockJob::generated(1).queued_for(Duration::from_secs(30))),
    );
    let id = engine.submit("db", "SELECT slow").await.unwrap();

    let err = orchestrator(&engine)
        .get_results(&id, RowCap::default(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::StillRunning(_)));
    assert!(err.to_string().contains("QUEUED"));
    assert_eq!(engine.calls().fetch_page, 0);
}

#[tokio::test]
async fn test_unknown_saved_query_is_not_submitted() {
    let engine = Arc::new(MockEngine::demo());

    let err = orchestrator(&engine)
        .submit_saved_and_wait(
            &SavedQueryRef::new("does-not-exist", None),
            RowCap::default(),
            WaitTimeout::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AthenaError::NotFound(_)));
    assert_eq!(engine.calls().submit, 0);
}

#[tokio::test(start_paused = true)]
async fn test_saved_query_runs_with_its_database() {
    let engine = Arc::new(MockEngine::demo());

    let outcome = orchestrator(&engine)
        .submit_saved_and_wait(
            &SavedQueryRef::new("demo-dau", None),
            RowCap::default(),
            WaitTimeout::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let Outcome::Completed(completed) = outcome else {
        panic!("expected Completed");
    };
    assert_eq!(completed.columns, vec!["day", "users"]);
    assert_eq!(completed.row_count, 2);
    assert_eq!(engine.submitted()[0].0, "analytics");
}

#[test]
fn test_row_cap_bounds_are_checked_before_any_call() {
    assert!(matches!(RowCap::new(Some(0)), Err(AthenaError::InvalidInput(_))));
    assert!(matches!(RowCap::new(Some(10_001)), Err(AthenaError::InvalidInput(_))));
    assert_eq!(RowCap::new(Some(10_000)).unwrap().get(), 10_000);
    assert_eq!(RowCap::new(None).unwrap().get(), 1000);
}

#[tokio::test]
async fn test_status_is_stable_after_terminal_state() {
    let engine = Arc::new(MockEngine::new().with_job("bad", MockJob::failed("TABLE_NOT_FOUND: t")));
    let orchestrator = orchestrator(&engine);
    let id = engine.submit("db", "SELECT bad").await.unwrap();

    let first = orchestrator.get_status(&id).await.unwrap();
    for _ in 0..5 {
        assert_eq!(orchestrator.get_status(&id).await.unwrap(), first);
    }
    assert_eq!(first.state, QueryState::Failed);
    assert_eq!(first.message.as_deref(), Some("TABLE_NOT_FOUND: t"));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_queries_are_independent() {
    let engine = Arc::new(
        MockEngine::new()
            .with_job("fast", MockJob::generated(2))
            .with_job("slow", MockJob::generated(4).running_for(Duration::from_secs(3))),
    );
    let orchestrator = orchestrator(&engine);

    let (fast_cancel, slow_cancel) = (CancellationToken::new(), CancellationToken::new());
    let (fast, slow) = tokio::join!(
        orchestrator.submit_and_wait(request("SELECT fast", None, None), &fast_cancel),
        orchestrator.submit_and_wait(request("SELECT slow", None, None), &slow_cancel),
    );

    let (fast, slow) = (fast.unwrap(), slow.unwrap());
    assert_ne!(fast.execution_id(), slow.execution_id());
    assert_eq!(fast.status(), QueryState::Succeeded);
    assert_eq!(slow.status(), QueryState::Succeeded);
}
