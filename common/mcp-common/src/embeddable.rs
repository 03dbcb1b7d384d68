//! In-process tool invocation
//!
//! [`EmbeddableMcp`] lets a host call a server's tools by name with a JSON
//! argument object, without going through the stdio transport. Servers
//! implement it by delegating to the same handlers their `#[tool_router]`
//! methods use, so both paths share one behaviour.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde_json::Value;

/// Error type for embeddable MCP operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddableError {
    /// No tool with this name is registered
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Arguments did not match the tool's parameter type
    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),

    /// Protocol-level failure raised by the handler
    #[error("mcp error: {0}")]
    McpError(String),
}

impl From<rmcp::ErrorData> for EmbeddableError {
    fn from(err: rmcp::ErrorData) -> Self {
        EmbeddableError::McpError(err.message.to_string())
    }
}

/// Result type for embeddable MCP operations
pub type EmbeddableResult<T> = Result<T, EmbeddableError>;

/// An MCP server whose tools can be invoked directly.
///
/// Implementations must be `Send + Sync`; hosts may issue concurrent calls.
#[async_trait]
pub trait EmbeddableMcp: Send + Sync {
    /// Name used to identify the server in host configuration
    fn server_name(&self) -> &str;

    /// All tools with their input schemas
    fn list_tools(&self) -> Vec<Tool>;

    /// Run tool `name` with a JSON object of arguments.
    ///
    /// Domain failures come back as an error-flagged `CallToolResult`;
    /// `Err` is reserved for unknown tools and malformed arguments.
    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult>;

    fn server_description(&self) -> Option<&str> {
        None
    }

    fn server_version(&self) -> Option<&str> {
        None
    }
}
