//! MCP Common - shared plumbing for the stdio MCP servers in this workspace
//!
//! - **Startup**: [`Bootstrap`] plus the `serve_stdio!` macro build a server
//!   from its environment and run it over stdin/stdout
//! - **Results**: [`json_success`] and [`json_error`] produce `CallToolResult`
//!   payloads that are always JSON objects
//! - **Errors**: [`ToolError`] classifies domain errors for the error payload
//! - **Embeddable**: [`EmbeddableMcp`] calls tools in-process by name
//!
//! # Example
//!
//! ```rust,ignore
//! use mcp_common::{serve_stdio, Bootstrap};
//!
//! impl Bootstrap for MyServer {
//!     fn bootstrap() -> anyhow::Result<Self> {
//!         Ok(MyServer::new(load_settings()?))
//!     }
//! }
//!
//! serve_stdio!(MyServer, "my_mcp");
//! ```

pub mod embeddable;
pub mod error;
pub mod init;
pub mod result;

pub use embeddable::{EmbeddableError, EmbeddableMcp, EmbeddableResult};
pub use error::{internal_error, McpResult, ToolError};
pub use init::{init_tracing, Bootstrap};
pub use result::{error_payload, json_error, json_success, tool_failure};

pub use rmcp::{
    model::{CallToolResult, Content, Tool},
    ErrorData as McpError,
};

pub use async_trait::async_trait;
