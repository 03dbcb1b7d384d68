//! Tool handlers
//!
//! Handlers turn tool parameters into gateway calls. Gateway errors are
//! reported to the client as error-flagged JSON results; an `Err` is only
//! returned when the response itself cannot be built.

use mcp_common::{json_success, tool_failure, CallToolResult, McpError, ToolError};
use serde::Serialize;

use crate::gateway::Gateway;
use crate::params::*;
use crate::types::{GatewayError, QueryOptions};
use crate::validator::sanitize_limit;

fn respond<T: Serialize>(
    tool: &str,
    result: Result<T, GatewayError>,
) -> Result<CallToolResult, McpError> {
    match result {
        Ok(data) => json_success(&data),
        Err(err) => {
            match &err {
                GatewayError::Validation(_) | GatewayError::Bind(_) => {
                    tracing::warn!(tool, kind = err.kind(), "Tool call rejected: {}", err)
                }
                GatewayError::Execution(_) | GatewayError::Pool(_) => {
                    tracing::error!(tool, kind = err.kind(), "Tool call failed: {}", err)
                }
            }
            Ok(tool_failure(&err))
        }
    }
}

/// The write policy always comes from server settings.
pub async fn query(gateway: &Gateway, params: QueryParams) -> Result<CallToolResult, McpError> {
    let options = QueryOptions {
        allow_write: None,
        max_rows: Some(sanitize_limit(params.max_rows, gateway.settings().max_rows)),
    };
    let result = gateway
        .execute_query(&params.sql, &params.params, options)
        .await;
    respond("query", result)
}

pub async fn explain_query(
    gateway: &Gateway,
    params: ExplainParams,
) -> Result<CallToolResult, McpError> {
    respond(
        "explain_query",
        gateway.explain_query(&params.sql, params.analyze).await,
    )
}

pub async fn list_schemas(gateway: &Gateway) -> Result<CallToolResult, McpError> {
    respond("list_schemas", gateway.list_schemas().await)
}

pub async fn list_tables(
    gateway: &Gateway,
    params: SchemaParams,
) -> Result<CallToolResult, McpError> {
    respond("list_tables", gateway.list_tables(&params.schema).await)
}

pub async fn list_views(
    gateway: &Gateway,
    params: SchemaParams,
) -> Result<CallToolResult, McpError> {
    respond("list_views", gateway.list_views(&params.schema).await)
}

pub async fn list_functions(
    gateway: &Gateway,
    params: SchemaParams,
) -> Result<CallToolResult, McpError> {
    respond("list_functions", gateway.list_functions(&params.schema).await)
}

pub async fn describe_table(
    gateway: &Gateway,
    params: TableParams,
) -> Result<CallToolResult, McpError> {
    respond(
        "describe_table",
        gateway
            .describe_table(&params.table_name, &params.schema)
            .await,
    )
}

pub async fn describe_view(
    gateway: &Gateway,
    params: ViewParams,
) -> Result<CallToolResult, McpError> {
    respond(
        "describe_view",
        gateway.describe_view(&params.view_name, &params.schema).await,
    )
}

pub async fn list_indexes(
    gateway: &Gateway,
    params: TableParams,
) -> Result<CallToolResult, McpError> {
    respond(
        "list_indexes",
        gateway.list_indexes(&params.table_name, &params.schema).await,
    )
}

pub async fn list_constraints(
    gateway: &Gateway,
    params: TableParams,
) -> Result<CallToolResult, McpError> {
    respond(
        "list_constraints",
        gateway
            .list_constraints(&params.table_name, &params.schema)
            .await,
    )
}

pub async fn table_stats(
    gateway: &Gateway,
    params: TableParams,
) -> Result<CallToolResult, McpError> {
    respond(
        "table_stats",
        gateway
            .get_table_stats(&params.table_name, &params.schema)
            .await,
    )
}

pub async fn search_columns(
    gateway: &Gateway,
    params: SearchColumnsParams,
) -> Result<CallToolResult, McpError> {
    respond(
        "search_columns",
        gateway
            .search_columns(&params.search_term, params.schema.as_deref(), params.limit)
            .await,
    )
}

pub async fn get_database_info(gateway: &Gateway) -> Result<CallToolResult, McpError> {
    respond("get_database_info", gateway.get_database_info().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ValidationError;
    use serde_json::Value;

    fn body(result: &CallToolResult) -> Value {
        let text = &result.content[0].as_text().unwrap().text;
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_respond_success() {
        let result = respond("list_schemas", Ok(vec!["public"])).unwrap();
        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(body(&result), serde_json::json!(["public"]));
    }

    #[test]
    fn test_respond_validation_failure() {
        let err: GatewayError = ValidationError::EmptyQuery.into();
        let result = respond::<()>("query", Err(err)).unwrap();
        assert_eq!(result.is_error, Some(true));
        let body = body(&result);
        assert_eq!(body["kind"], "validation");
        assert_eq!(body["error"], "Query cannot be empty");
    }

    #[test]
    fn test_respond_pool_failure() {
        let result =
            respond::<()>("query", Err(GatewayError::Pool("timed out".into()))).unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(body(&result)["kind"], "pool");
    }
}
