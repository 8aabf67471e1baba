//! Model Context Protocol surface.
//!
//! Exposes the query orchestrator as MCP tools over stdio or HTTP+SSE.

pub mod handler;
pub mod protocol;
pub mod sse;
pub mod stdio;
pub mod tools;

pub use handler::{InFlight, McpHandler, SERVER_NAME};
pub use protocol::{JsonRpcMessage, JsonRpcResponse, ToolCallResult};
pub use sse::serve_sse;
pub use stdio::serve_stdio;
pub use tools::{get_tool_definitions, ToolCall, ToolDefinition, ToolName};
