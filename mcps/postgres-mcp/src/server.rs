//! MCP Server implementation for PostgreSQL
//!
//! This module defines the main MCP server that exposes the gateway as tools.
//! Handler implementations are in the handlers module.

use std::sync::Arc;

use mcp_common::{
    async_trait, Bootstrap, CallToolResult, EmbeddableError, EmbeddableMcp, EmbeddableResult,
    McpError, Tool,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use serde_json::Value;

use crate::config::Settings;
use crate::gateway::Gateway;
use crate::handlers;
use crate::params::*;
use crate::pool::build_pool;

/// The PostgreSQL MCP Server
#[derive(Clone)]
pub struct PostgresMcpServer {
    gateway: Gateway,
    tool_router: ToolRouter<Self>,
}

// ============================================================================
// Tool Router - Each tool delegates to its handler
// ============================================================================

#[tool_router]
impl PostgresMcpServer {
    /// Create a server over an existing gateway
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway,
            tool_router: Self::tool_router(),
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    #[tool(
        description = "Execute a SQL query with optional $1, $2, ... parameters. Returns rows (capped at MAX_ROWS, with a truncated flag) or the affected-row count. Write statements require ALLOW_WRITE_OPERATIONS=true."
    )]
    async fn query(
        &self,
        Parameters(params): Parameters<QueryParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::query(&self.gateway, params).await
    }

    #[tool(
        description = "Show the JSON execution plan for a read-only query. With analyze=true the query is executed to collect actual timings and buffer usage."
    )]
    async fn explain_query(
        &self,
        Parameters(params): Parameters<ExplainParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::explain_query(&self.gateway, params).await
    }

    #[tool(description = "List user schemas and their owners")]
    async fn list_schemas(&self) -> Result<CallToolResult, McpError> {
        handlers::list_schemas(&self.gateway).await
    }

    #[tool(description = "List tables and views in a schema")]
    async fn list_tables(
        &self,
        Parameters(params): Parameters<SchemaParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_tables(&self.gateway, params).await
    }

    #[tool(description = "List views in a schema and whether they are updatable")]
    async fn list_views(
        &self,
        Parameters(params): Parameters<SchemaParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_views(&self.gateway, params).await
    }

    #[tool(description = "List functions and procedures in a schema with their signatures")]
    async fn list_functions(
        &self,
        Parameters(params): Parameters<SchemaParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_functions(&self.gateway, params).await
    }

    #[tool(description = "Describe a table's columns, primary key and foreign keys")]
    async fn describe_table(
        &self,
        Parameters(params): Parameters<TableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::describe_table(&self.gateway, params).await
    }

    #[tool(description = "Show a view's definition and columns")]
    async fn describe_view(
        &self,
        Parameters(params): Parameters<ViewParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::describe_view(&self.gateway, params).await
    }

    #[tool(description = "List a table's indexes with their columns and sizes")]
    async fn list_indexes(
        &self,
        Parameters(params): Parameters<TableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_indexes(&self.gateway, params).await
    }

    #[tool(description = "List a table's constraints, one entry per constraint with its columns")]
    async fn list_constraints(
        &self,
        Parameters(params): Parameters<TableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::list_constraints(&self.gateway, params).await
    }

    #[tool(
        description = "Table sizes, exact and estimated row counts, scan counters and vacuum/analyze times. The exact count scans the table."
    )]
    async fn table_stats(
        &self,
        Parameters(params): Parameters<TableParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::table_stats(&self.gateway, params).await
    }

    #[tool(description = "Find columns whose name contains a search term, across schemas or in one schema")]
    async fn search_columns(
        &self,
        Parameters(params): Parameters<SearchColumnsParams>,
    ) -> Result<CallToolResult, McpError> {
        handlers::search_columns(&self.gateway, params).await
    }

    #[tool(description = "Server version, database size, connection counts and this server's access mode")]
    async fn get_database_info(&self) -> Result<CallToolResult, McpError> {
        handlers::get_database_info(&self.gateway).await
    }
}

impl Bootstrap for PostgresMcpServer {
    fn bootstrap() -> anyhow::Result<Self> {
        let settings = Arc::new(Settings::from_env()?);
        tracing::info!(?settings, "Configuration loaded");
        let pool = build_pool(&settings)?;
        Ok(Self::new(Gateway::new(pool, settings)))
    }
}

fn instructions(allow_write: bool) -> String {
    let mode = if allow_write {
        "Write operations are ENABLED: INSERT, UPDATE, DELETE and DDL are accepted."
    } else {
        "The server is READ-ONLY: only SELECT, WITH, EXPLAIN, SHOW, DESCRIBE and SET are accepted."
    };
    format!(
        "PostgreSQL MCP server for schema introspection and guarded query execution. {} \
         SQL comments and stacked destructive statements are always rejected. \
         Pass values as $1, $2, ... parameters instead of inlining them.",
        mode
    )
}

// ============================================================================
// Server Handler Implementation
// ============================================================================

#[tool_handler]
impl rmcp::ServerHandler for PostgresMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(instructions(self.gateway.settings().allow_write_operations)),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Embeddable Implementation
// ============================================================================

#[async_trait]
impl EmbeddableMcp for PostgresMcpServer {
    fn server_name(&self) -> &str {
        "postgres"
    }

    fn server_description(&self) -> Option<&str> {
        Some(
            "PostgreSQL MCP Server - schema introspection, query plans and \
             validated query execution over a pooled connection.",
        )
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult> {
        match name {
            "query" => {
                let params: QueryParams = serde_json::from_value(params)?;
                self.query(Parameters(params)).await.map_err(Into::into)
            }

            "explain_query" => {
                let params: ExplainParams = serde_json::from_value(params)?;
                self.explain_query(Parameters(params)).await.map_err(Into::into)
            }

            "list_schemas" => self.list_schemas().await.map_err(Into::into),

            "list_tables" => {
                let params: SchemaParams = serde_json::from_value(params)?;
                self.list_tables(Parameters(params)).await.map_err(Into::into)
            }

            "list_views" => {
                let params: SchemaParams = serde_json::from_value(params)?;
                self.list_views(Parameters(params)).await.map_err(Into::into)
            }

            "list_functions" => {
                let params: SchemaParams = serde_json::from_value(params)?;
                self.list_functions(Parameters(params)).await.map_err(Into::into)
            }

            "describe_table" => {
                let params: TableParams = serde_json::from_value(params)?;
                self.describe_table(Parameters(params)).await.map_err(Into::into)
            }

            "describe_view" => {
                let params: ViewParams = serde_json::from_value(params)?;
                self.describe_view(Parameters(params)).await.map_err(Into::into)
            }

            "list_indexes" => {
                let params: TableParams = serde_json::from_value(params)?;
                self.list_indexes(Parameters(params)).await.map_err(Into::into)
            }

            "list_constraints" => {
                let params: TableParams = serde_json::from_value(params)?;
                self.list_constraints(Parameters(params))
                    .await
                    .map_err(Into::into)
            }

            "table_stats" => {
                let params: TableParams = serde_json::from_value(params)?;
                self.table_stats(Parameters(params)).await.map_err(Into::into)
            }

            "search_columns" => {
                let params: SearchColumnsParams = serde_json::from_value(params)?;
                self.search_columns(Parameters(params)).await.map_err(Into::into)
            }

            "get_database_info" => self.get_database_info().await.map_err(Into::into),

            _ => Err(EmbeddableError::ToolNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::tests::unreachable_gateway;
    use serde_json::json;

    fn body(result: &CallToolResult) -> Value {
        let text = &result.content[0].as_text().unwrap().text;
        serde_json::from_str(text).unwrap()
    }

    #[tokio::test]
    async fn test_lists_all_tools() {
        let server = PostgresMcpServer::new(unreachable_gateway(false));
        let mut names: Vec<String> = server
            .list_tools()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "describe_table",
                "describe_view",
                "explain_query",
                "get_database_info",
                "list_constraints",
                "list_functions",
                "list_indexes",
                "list_schemas",
                "list_tables",
                "list_views",
                "query",
                "search_columns",
                "table_stats",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let server = PostgresMcpServer::new(unreachable_gateway(false));
        let err = server.call_tool("drop_everything", json!({})).await.unwrap_err();
        assert!(matches!(err, EmbeddableError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_malformed_arguments() {
        let server = PostgresMcpServer::new(unreachable_gateway(false));
        let err = server
            .call_tool("describe_table", json!({"schema": "public"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddableError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn test_rejected_query_is_error_payload() {
        let server = PostgresMcpServer::new(unreachable_gateway(false));
        let result = server
            .call_tool("query", json!({"sql": "DELETE FROM orders"}))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        let body = body(&result);
        assert_eq!(body["kind"], "validation");
        assert!(body["error"].as_str().unwrap().contains("DELETE"));
    }

    #[tokio::test]
    async fn test_bad_identifier_is_error_payload() {
        let server = PostgresMcpServer::new(unreachable_gateway(false));
        let result = server
            .call_tool(
                "list_indexes",
                json!({"table_name": "orders; DROP TABLE x"}),
            )
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(body(&result)["kind"], "validation");
    }

    #[tokio::test]
    async fn test_unreachable_database_is_error_payload() {
        let server = PostgresMcpServer::new(unreachable_gateway(false));
        let result = server.call_tool("list_schemas", json!({})).await.unwrap();
        assert_eq!(result.is_error, Some(true));
        let body = body(&result);
        assert_eq!(body["kind"], "pool");
        assert!(!body["error"]
            .as_str()
            .unwrap()
            .contains("test_fake_password_123"));
    }

    #[tokio::test]
    async fn test_instructions_reflect_mode() {
        let read_only = PostgresMcpServer::new(unreachable_gateway(false));
        let info = rmcp::ServerHandler::get_info(&read_only);
        assert!(info.instructions.unwrap().contains("READ-ONLY"));

        let writable = PostgresMcpServer::new(unreachable_gateway(true));
        let info = rmcp::ServerHandler::get_info(&writable);
        assert!(info.instructions.unwrap().contains("ENABLED"));
        assert!(info.capabilities.tools.is_some());
    }
}
