//! MCP request dispatch.
//!
//! Turns JSON-RPC messages into orchestrator calls and orchestrator results
//! into tool responses. Transports own framing and concurrency; everything
//! here is per-message.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::protocol::{
    JsonRpcMessage, JsonRpcResponse, ToolCallResult, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, JSONRPC_VERSION, METHOD_NOT_FOUND, PROTOCOL_VERSION,
};
use super::tools::{get_tool_definitions, SavedQueryListing, StatusReport, ToolCall, ToolName};
use crate::error::{AthenaError, Result};
use crate::query::poller::until_cancelled;
use crate::query::{Orchestrator, Outcome};

/// Name reported in `initialize` and on the health endpoint.
pub const SERVER_NAME: &str = "aws-athena-mcp";

const PENDING_HINT: &str = "Query is still running. Use get_status to check progress and \
                            get_result to fetch rows once it has finished.";

enum Reply {
    Result(Value),
    Error(i64, String),
    /// Cancelled requests get no response.
    Silent,
}

/// Handles MCP methods for one server. Shared by all connections.
#[derive(Clone)]
pub struct McpHandler {
    orchestrator: Orchestrator,
}

impl McpHandler {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Handles one message. Returns the response to send, if any.
    ///
    /// Notifications never produce a response, and neither does a request
    /// whose `cancel` token fired before it finished.
    pub async fn handle(
        &self,
        message: JsonRpcMessage,
        cancel: &CancellationToken,
    ) -> Option<JsonRpcResponse> {
        let Some(method) = message.method.as_deref() else {
            debug!("Ignoring message without a method");
            return None;
        };

        let Some(id) = message.id.clone() else {
            debug!(method, "Notification received");
            return None;
        };

        if message.jsonrpc.as_deref() != Some(JSONRPC_VERSION) {
            return Some(JsonRpcResponse::error(
                id,
                INVALID_REQUEST,
                "Invalid Request: jsonrpc must be \"2.0\"",
            ));
        }

        let reply = match method {
            "initialize" => Reply::Result(initialize_result(message.params.as_ref())),
            "ping" => Reply::Result(json!({})),
            "tools/list" => Reply::Result(json!({ "tools": get_tool_definitions() })),
            "tools/call" => self.call_tool(message.params.as_ref(), cancel).await,
            other => Reply::Error(METHOD_NOT_FOUND, format!("Method not found: {other}")),
        };

        match reply {
            Reply::Result(result) => Some(JsonRpcResponse::success(id, result)),
            Reply::Error(code, text) => Some(JsonRpcResponse::error(id, code, text)),
            Reply::Silent => {
                debug!(method, "Request cancelled, dropping response");
                None
            }
        }
    }

    async fn call_tool(&self, params: Option<&Value>, cancel: &CancellationToken) -> Reply {
        let Some(name) = params.and_then(|p| p.get("name")).and_then(Value::as_str) else {
            return Reply::Error(INVALID_PARAMS, "Missing tool name".to_string());
        };
        let Ok(tool) = name.parse::<ToolName>() else {
            return Reply::Error(METHOD_NOT_FOUND, format!("Unknown tool: {name}"));
        };
        let call = match ToolCall::parse(tool, params.and_then(|p| p.get("arguments"))) {
            Ok(call) => call,
            Err(e) => return Reply::Error(INVALID_PARAMS, e.to_string()),
        };

        debug!(tool = name, "Calling tool");
        let outcome = self.run(call, cancel).await.and_then(|value| {
            serde_json::to_string_pretty(&value)
                .map_err(|e| AthenaError::internal(format!("Failed to render result: {e}")))
        });

        let result = match outcome {
            Ok(text) => ToolCallResult::text(text),
            Err(AthenaError::Cancelled) => return Reply::Silent,
            Err(e) => {
                warn!(tool = name, category = e.category(), error = %e, "Tool call failed");
                ToolCallResult::error(format!("Error: {e}"))
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => Reply::Result(value),
            Err(e) => Reply::Error(INTERNAL_ERROR, format!("Failed to encode result: {e}")),
        }
    }

    async fn run(&self, call: ToolCall, cancel: &CancellationToken) -> Result<Value> {
        match call {
            ToolCall::RunQuery(request) => {
                render_outcome(self.orchestrator.submit_and_wait(request, cancel).await?)
            }
            ToolCall::GetResult {
                execution_id,
                row_cap,
            } => render_outcome(
                self.orchestrator
                    .get_results(&execution_id, row_cap, cancel)
                    .await?,
            ),
            ToolCall::GetStatus { execution_id } => {
                let status =
                    until_cancelled(cancel, self.orchestrator.get_status(&execution_id)).await?;
                to_json(&StatusReport::new(execution_id, status))
            }
            ToolCall::RunSavedQuery {
                reference,
                row_cap,
                timeout,
            } => render_outcome(
                self.orchestrator
                    .submit_saved_and_wait(&reference, row_cap, timeout, cancel)
                    .await?,
            ),
            ToolCall::ListSavedQueries => {
                let saved = until_cancelled(cancel, self.orchestrator.list_saved_queries()).await?;
                to_json(&SavedQueryListing::from(saved))
            }
        }
    }
}

fn initialize_result(params: Option<&Value>) -> Value {
    let protocol_version = params
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or(PROTOCOL_VERSION);

    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| AthenaError::internal(format!("Failed to serialize result: {e}")))
}

fn render_outcome(outcome: Outcome) -> Result<Value> {
    let mut value = to_json(&outcome)?;
    if let (Outcome::Pending(_), Value::Object(map)) = (&outcome, &mut value) {
        map.insert("message".to_string(), Value::from(PENDING_HINT));
    }
    Ok(value)
}

/// Requests running on one connection, keyed by JSON-RPC id.
#[derive(Debug, Default)]
pub struct InFlight {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

/// Removes its request from [`InFlight`] when dropped.
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
    key: Option<String>,
}

impl InFlight {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        self.tokens.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers `message` under its id, if it has one.
    pub fn track(self: &Arc<Self>, message: &JsonRpcMessage, token: CancellationToken) -> InFlightGuard {
        let key = message.request_key();
        if let Some(key) = &key {
            self.lock().insert(key.clone(), token);
        }
        InFlightGuard {
            in_flight: Arc::clone(self),
            key,
        }
    }

    /// Cancels the request with this key. Returns false if it already finished.
    pub fn cancel(&self, key: &str) -> bool {
        match self.lock().remove(key) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some(key) = &self.key {
            self.in_flight.lock().remove(key);
        }
    }
}
