//! Tool definitions and argument parsing.
//!
//! Arguments are validated into typed calls here, before the orchestrator
//! or the engine is touched.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::str::FromStr;

use crate::engine::{ExecutionId, ExecutionStatus, QueryState, SavedQuerySummary};
use crate::error::{AthenaError, Result};
use crate::query::{QueryRequest, RowCap, SavedQueryRef, WaitTimeout};

/// Tool definition advertised through `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Tools this server exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    RunQuery,
    GetResult,
    GetStatus,
    RunSavedQuery,
    ListSavedQueries,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RunQuery => "run_query",
            Self::GetResult => "get_result",
            Self::GetStatus => "get_status",
            Self::RunSavedQuery => "run_saved_query",
            Self::ListSavedQueries => "list_saved_queries",
        }
    }
}

impl FromStr for ToolName {
    type Err = AthenaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "run_query" => Ok(Self::RunQuery),
            "get_result" => Ok(Self::GetResult),
            "get_status" => Ok(Self::GetStatus),
            "run_saved_query" => Ok(Self::RunSavedQuery),
            "list_saved_queries" => Ok(Self::ListSavedQueries),
            _ => Err(AthenaError::not_found(format!("Unknown tool: {s}"))),
        }
    }
}

fn max_rows_schema() -> Value {
    json!({
        "type": "number",
        "description": "Maximum number of rows to return (default: 1000)",
        "minimum": 1,
        "maximum": 10000
    })
}

fn timeout_schema() -> Value {
    json!({
        "type": "number",
        "description": "How long to wait for completion in milliseconds (default: 60000)",
        "minimum": 1000
    })
}

fn execution_id_schema() -> Value {
    json!({
        "type": "string",
        "description": "The query execution ID"
    })
}

/// Returns the tool definitions advertised to clients.
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: ToolName::RunQuery.as_str().to_string(),
            description: "Execute a SQL query using AWS Athena. Returns full results if the query \
                          completes before the timeout, otherwise returns the queryExecutionId to \
                          check back with later."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "database": {
                        "type": "string",
                        "description": "The Athena database to query"
                    },
                    "query": {
                        "type": "string",
                        "description": "SQL query to execute"
                    },
                    "maxRows": max_rows_schema(),
                    "timeoutMs": timeout_schema()
                },
                "required": ["database", "query"]
            }),
        },
        ToolDefinition {
            name: ToolName::GetResult.as_str().to_string(),
            description: "Get results for a completed query. Returns an error if the query is \
                          still running."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "queryExecutionId": execution_id_schema(),
                    "maxRows": max_rows_schema()
                },
                "required": ["queryExecutionId"]
            }),
        },
        ToolDefinition {
            name: ToolName::GetStatus.as_str().to_string(),
            description: "Get the current status of a query execution".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "queryExecutionId": execution_id_schema()
                },
                "required": ["queryExecutionId"]
            }),
        },
        ToolDefinition {
            name: ToolName::RunSavedQuery.as_str().to_string(),
            description: "Execute a saved (named) Athena query by its query ID.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "namedQueryId": {
                        "type": "string",
                        "description": "Athena NamedQueryId"
                    },
                    "databaseOverride": {
                        "type": "string",
                        "description": "Optional database to run the saved query against"
                    },
                    "maxRows": max_rows_schema(),
                    "timeoutMs": timeout_schema()
                },
                "required": ["namedQueryId"]
            }),
        },
        ToolDefinition {
            name: ToolName::ListSavedQueries.as_str().to_string(),
            description: "List all saved (named) Athena queries available in the account."
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

/// A tool invocation with validated arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    RunQuery(QueryRequest),
    GetResult {
        execution_id: ExecutionId,
        row_cap: RowCap,
    },
    GetStatus {
        execution_id: ExecutionId,
    },
    RunSavedQuery {
        reference: SavedQueryRef,
        row_cap: RowCap,
        timeout: WaitTimeout,
    },
    ListSavedQueries,
}

impl ToolCall {
    /// Validates raw `arguments` for `tool`.
    pub fn parse(tool: ToolName, arguments: Option<&Value>) -> Result<Self> {
        let empty = Map::new();
        let args = match arguments {
            None | Some(Value::Null) => &empty,
            Some(Value::Object(map)) => map,
            Some(_) => return Err(AthenaError::invalid_input("arguments must be an object")),
        };

        match tool {
            ToolName::RunQuery => {
                let database = required_string(args, "database")?;
                let query = required_string(args, "query")?;
                let row_cap = RowCap::new(optional_integer(args, "maxRows")?)?;
                let timeout = WaitTimeout::new(optional_integer(args, "timeoutMs")?)?;
                Ok(Self::RunQuery(QueryRequest::new(database, query, row_cap, timeout)?))
            }
            ToolName::GetResult => Ok(Self::GetResult {
                execution_id: required_string(args, "queryExecutionId")?.into(),
                row_cap: RowCap::new(optional_integer(args, "maxRows")?)?,
            }),
            ToolName::GetStatus => Ok(Self::GetStatus {
                execution_id: required_string(args, "queryExecutionId")?.into(),
            }),
            ToolName::RunSavedQuery => {
                let saved_query_id = required_string(args, "namedQueryId")?;
                let database_override = optional_string(args, "databaseOverride")?;
                Ok(Self::RunSavedQuery {
                    reference: SavedQueryRef::new(saved_query_id, database_override),
                    row_cap: RowCap::new(optional_integer(args, "maxRows")?)?,
                    timeout: WaitTimeout::new(optional_integer(args, "timeoutMs")?)?,
                })
            }
            ToolName::ListSavedQueries => Ok(Self::ListSavedQueries),
        }
    }
}

fn required_string(args: &Map<String, Value>, key: &str) -> Result<String> {
    match args.get(key) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(AthenaError::invalid_input(format!(
            "Missing or invalid required parameter: {key} (string)"
        ))),
    }
}

fn optional_string(args: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) if value.trim().is_empty() => {
            Err(AthenaError::invalid_input(format!("{key} must not be empty")))
        }
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(AthenaError::invalid_input(format!("{key} must be a string"))),
    }
}

/// Accepts whole numbers, including `100.0` as some clients send.
fn optional_integer(args: &Map<String, Value>, key: &str) -> Result<Option<u64>> {
    let value = match args.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(value) => value,
    };

    if let Some(n) = value.as_u64() {
        return Ok(Some(n));
    }
    match value.as_f64() {
        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => Ok(Some(f as u64)),
        _ => Err(AthenaError::invalid_input(format!(
            "{key} must be a non-negative integer, got {value}"
        ))),
    }
}

/// Output of `get_status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub query_execution_id: ExecutionId,
    pub status: QueryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReport {
    pub fn new(execution_id: ExecutionId, status: ExecutionStatus) -> Self {
        Self {
            query_execution_id: execution_id,
            status: status.state,
            message: status.message,
        }
    }
}

/// Output of `list_saved_queries`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedQueryListing {
    pub saved_queries: Vec<SavedQuerySummary>,
    pub count: usize,
}

impl From<Vec<SavedQuerySummary>> for SavedQueryListing {
    fn from(saved_queries: Vec<SavedQuerySummary>) -> Self {
        Self {
            count: saved_queries.len(),
            saved_queries,
        }
    }
}
