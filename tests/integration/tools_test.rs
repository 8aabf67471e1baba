//! MCP tool calls end to end: JSON-RPC in, tool result JSON out.

use std::sync::Arc;
use std::time::Duration;

use aws_athena_mcp::engine::{MockEngine, MockJob};
use aws_athena_mcp::mcp::{JsonRpcMessage, JsonRpcResponse, McpHandler};
use aws_athena_mcp::query::{Orchestrator, PollPolicy};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

struct Harness {
    engine: Arc<MockEngine>,
    handler: McpHandler,
    next_id: u64,
}

impl Harness {
    fn new(engine: MockEngine) -> Self {
        let engine = Arc::new(engine);
        let handler = McpHandler::new(Orchestrator::new(engine.clone(), PollPolicy::default()));
        Self {
            engine,
            handler,
            next_id: 0,
        }
    }

    async fn call(&mut self, tool: &str, arguments: Value) -> JsonRpcResponse {
        self.next_id += 1;
        let message: JsonRpcMessage = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": "tools/call",
            "params": { "name": tool, "arguments": arguments }
        }))
        .unwrap();
        self.handler
            .handle(message, &CancellationToken::new())
            .await
            .expect("request should get a response")
    }

    /// Calls a tool that is expected to succeed and returns its parsed body.
    async fn ok(&mut self, tool: &str, arguments: Value) -> Value {
        let response = self.call(tool, arguments).await;
        let result = response.result.expect("expected a result");
        assert!(result.get("isError").is_none(), "unexpected tool error: {result}");
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap()
    }

    /// Calls a tool that is expected to report an error and returns its text.
    async fn tool_error(&mut self, tool: &str, arguments: Value) -> String {
        let response = self.call(tool, arguments).await;
        let result = response.result.expect("expected a result");
        assert_eq!(result["isError"], json!(true));
        result["content"][0]["text"].as_str().unwrap().to_string()
    }
}

#[tokio::test(start_paused = true)]
async fn test_run_query_then_resume_by_execution_id() {
    let mut harness = Harness::new(
        MockEngine::new().with_job("orders", MockJob::generated(12).running_for(Duration::from_secs(5))),
    );

    let pending = harness
        .ok(
            "run_query",
            json!({ "database": "sales", "query": "SELECT * FROM orders", "timeoutMs": 1000 }),
        )
        .await;
    assert_eq!(pending["status"], "RUNNING");
    let execution_id = pending["queryExecutionId"].as_str().unwrap().to_string();

    let error = harness
        .tool_error("get_result", json!({ "queryExecutionId": execution_id }))
        .await;
    assert!(error.starts_with("Error: Query is still running"));

    tokio::time::sleep(Duration::from_secs(5)).await;

    let status = harness
        .ok("get_status", json!({ "queryExecutionId": execution_id }))
        .await;
    assert_eq!(status, json!({ "queryExecutionId": execution_id, "status": "SUCCEEDED" }));

    let completed = harness
        .ok("get_result", json!({ "queryExecutionId": execution_id, "maxRows": 10 }))
        .await;
    assert_eq!(completed["queryExecutionId"], json!(execution_id));
    assert_eq!(completed["rowCount"], 10);
    assert_eq!(completed["truncated"], true);
    assert_eq!(completed["rows"].as_array().unwrap().len(), 10);
}

#[tokio::test]
async fn test_out_of_range_max_rows_never_reaches_engine() {
    let mut harness = Harness::new(MockEngine::new());

    for max_rows in [0, 10_001] {
        let response = harness
            .call(
                "run_query",
                json!({ "database": "db", "query": "SELECT 1", "maxRows": max_rows }),
            )
            .await;
        let error = response.error.expect("expected a JSON-RPC error");
        assert_eq!(error.code, -32602);
        assert!(error.message.contains("maxRows"));
    }

    let response = harness
        .call("get_result", json!({ "queryExecutionId": "q-1", "maxRows": 0 }))
        .await;
    assert!(response.error.is_some());

    assert_eq!(harness.engine.calls().total(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_failed_query_reports_reason_without_tool_error() {
    let mut harness = Harness::new(MockEngine::demo());

    let failed = harness
        .ok("run_query", json!({ "database": "db", "query": "SELECT syntax_error" }))
        .await;
    assert_eq!(failed["status"], "FAILED");
    assert_eq!(
        failed["message"],
        "line 1:8: mismatched input 'FORM'. Expecting: <expression>"
    );
    assert!(failed.get("rows").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_saved_queries() {
    let mut harness = Harness::new(MockEngine::demo());

    let listing = harness.ok("list_saved_queries", json!({})).await;
    assert_eq!(listing["count"], 1);
    assert_eq!(listing["savedQueries"][0]["id"], "demo-dau");
    assert_eq!(listing["savedQueries"][0]["database"], "analytics");

    let completed = harness
        .ok(
            "run_saved_query",
            json!({ "namedQueryId": "demo-dau", "databaseOverride": "analytics_staging" }),
        )
        .await;
    assert_eq!(completed["status"], "SUCCEEDED");
    assert_eq!(completed["columns"], json!(["day", "users"]));
    assert_eq!(completed["rows"][0], json!(["2024-06-01", "1204"]));
    assert_eq!(harness.engine.submitted()[0].0, "analytics_staging");

    let error = harness
        .tool_error("run_saved_query", json!({ "namedQueryId": "nope" }))
        .await;
    assert_eq!(error, "Error: Not found: NamedQuery nope was not found");
    assert_eq!(harness.engine.calls().submit, 1);
}

#[tokio::test]
async fn test_blank_database_override_never_reaches_engine() {
    let mut harness = Harness::new(MockEngine::demo());

    let response = harness
        .call(
            "run_saved_query",
            json!({ "namedQueryId": "demo-dau", "databaseOverride": "" }),
        )
        .await;
    let error = response.error.expect("expected a JSON-RPC error");
    assert_eq!(error.code, -32602);
    assert!(error.message.contains("databaseOverride"));

    assert_eq!(harness.engine.calls().total(), 0);
}

#[tokio::test]
async fn test_unknown_execution_id() {
    let mut harness = Harness::new(MockEngine::new());

    let error = harness
        .tool_error("get_status", json!({ "queryExecutionId": "0000-missing" }))
        .await;
    assert!(error.contains("0000-missing"));
}

#[tokio::test(start_paused = true)]
async fn test_null_values_are_preserved() {
    let mut harness = Harness::new(MockEngine::new().with_job(
        "sparse",
        MockJob::rows(
            &["id", "email"],
            vec![
                vec![Some("1".to_string()), None],
                vec![Some("2".to_string()), Some("b@example.com".to_string())],
            ],
        ),
    ));

    let completed = harness
        .ok("run_query", json!({ "database": "db", "query": "SELECT sparse" }))
        .await;
    assert_eq!(
        completed["rows"],
        json!([["1", null], ["2", "b@example.com"]])
    );
}
