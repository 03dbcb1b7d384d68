//! Type definitions for the PostgreSQL MCP server

use chrono::{DateTime, Utc};
use mcp_common::ToolError;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::bind::BindError;
use crate::validator::ValidationError;

/// One result row, keyed by column name in column order
pub type RowMap = Map<String, Value>;

// ============================================================================
// Query Results
// ============================================================================

/// Per-call overrides for [`Gateway::execute_query`](crate::Gateway::execute_query)
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOptions {
    /// Defaults to the server's `allow_write_operations`
    pub allow_write: Option<bool>,
    /// Defaults to the server's `max_rows`
    pub max_rows: Option<usize>,
}

/// Uniform envelope for `execute_query`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub rows: Vec<RowMap>,
    pub row_count: usize,
    pub columns: Vec<String>,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionResult {
    /// Envelope for a row-returning statement.
    ///
    /// `rows` may hold up to one row more than `max_rows`; the surplus row is
    /// how the caller learns the result was cut short.
    pub fn from_rows(columns: Vec<String>, mut rows: Vec<RowMap>, max_rows: usize) -> Self {
        let truncated = rows.len() > max_rows;
        rows.truncate(max_rows);
        Self {
            success: true,
            row_count: rows.len(),
            rows,
            columns,
            truncated,
            message: None,
        }
    }

    /// Envelope for a statement that only reports an affected-row count.
    pub fn affected(count: u64) -> Self {
        Self {
            success: true,
            rows: Vec::new(),
            row_count: 0,
            columns: Vec::new(),
            truncated: false,
            message: Some(format!(
                "Query executed successfully. {} rows affected.",
                count
            )),
        }
    }
}

/// Outcome of `explain_query`.
///
/// Serializes as `{"success": true, "plan": ...}` or
/// `{"success": false, "error": "..."}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ExplainResult {
    Plan(Value),
    Failure(String),
}

impl ExplainResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExplainResult::Plan(_))
    }
}

impl Serialize for ExplainResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        match self {
            ExplainResult::Plan(plan) => {
                map.serialize_entry("success", &true)?;
                map.serialize_entry("plan", plan)?;
            }
            ExplainResult::Failure(error) => {
                map.serialize_entry("success", &false)?;
                map.serialize_entry("error", error)?;
            }
        }
        map.end()
    }
}

// ============================================================================
// Catalog Records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaInfo {
    pub schema_name: String,
    pub schema_owner: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub table_name: String,
    pub table_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewInfo {
    pub table_name: String,
    pub is_updatable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionInfo {
    pub function_name: String,
    pub arguments: String,
    pub return_type: Option<String>,
    pub function_type: Option<String>,
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDescription {
    pub column_name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub column_default: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_maximum_length: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_precision: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<i32>,
    pub is_primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForeignKey {
    pub column_name: String,
    pub foreign_table_schema: String,
    pub foreign_table_name: String,
    pub foreign_column_name: String,
}

/// `found: false` with empty lists when the table does not exist
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescription {
    pub found: bool,
    pub schema: String,
    pub table_name: String,
    pub columns: Vec<ColumnDescription>,
    pub primary_keys: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewDescription {
    pub found: bool,
    pub schema: String,
    pub view_name: String,
    pub definition: Option<String>,
    pub columns: Vec<ColumnDescription>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexInfo {
    pub index_name: String,
    pub index_definition: String,
    pub is_unique: bool,
    pub is_primary: bool,
    pub columns: Vec<String>,
    pub index_size: String,
}

/// One catalog row per (constraint, column) pair, before grouping
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintRow {
    pub constraint_name: String,
    pub constraint_type: String,
    pub column_name: Option<String>,
    pub foreign_table_name: Option<String>,
    pub foreign_column_name: Option<String>,
    pub check_clause: Option<String>,
}

/// A constraint with all of its columns
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constraint {
    pub constraint_name: String,
    pub constraint_type: String,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_column_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_clause: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStats {
    pub found: bool,
    pub schema: String,
    pub table_name: String,
    #[serde(flatten)]
    pub details: Option<TableStatsDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableStatsDetails {
    /// Exact `count(*)`
    pub row_count: i64,
    /// Planner estimate from `pg_class.reltuples`
    pub estimated_rows: i64,
    pub total_size: String,
    pub table_size: String,
    pub indexes_size: String,
    pub sequential_scans: Option<i64>,
    pub index_scans: Option<i64>,
    pub live_tuples: Option<i64>,
    pub dead_tuples: Option<i64>,
    pub last_vacuum: Option<DateTime<Utc>>,
    pub last_autovacuum: Option<DateTime<Utc>>,
    pub last_analyze: Option<DateTime<Utc>>,
    pub last_autoanalyze: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnMatch {
    pub table_schema: String,
    pub table_name: String,
    pub column_name: String,
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatabaseInfo {
    pub database: String,
    pub version: String,
    pub current_user: String,
    pub server_encoding: String,
    pub timezone: String,
    pub size: String,
    pub max_connections: i32,
    pub active_connections: i64,
    pub read_only: bool,
    pub max_rows: usize,
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Bind(#[from] BindError),

    /// Driver, network or timeout failure; secrets already scrubbed
    #[error("Query execution failed: {0}")]
    Execution(String),

    #[error("Could not acquire a database connection: {0}")]
    Pool(String),
}

impl ToolError for GatewayError {
    fn kind(&self) -> &'static str {
        match self {
            GatewayError::Validation(_) | GatewayError::Bind(_) => "validation",
            GatewayError::Execution(_) => "execution",
            GatewayError::Pool(_) => "pool",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(n: usize) -> Vec<RowMap> {
        (0..n)
            .map(|i| {
                let mut row = RowMap::new();
                row.insert("id".to_string(), json!(i));
                row
            })
            .collect()
    }

    #[test]
    fn test_rows_under_cap_not_truncated() {
        let result = ExecutionResult::from_rows(vec!["id".to_string()], rows(5), 10);
        assert!(result.success);
        assert_eq!(result.row_count, 5);
        assert!(!result.truncated);
        assert!(result.message.is_none());
    }

    #[test]
    fn test_rows_over_cap_truncated() {
        let result = ExecutionResult::from_rows(vec!["id".to_string()], rows(5), 3);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.rows.len(), 3);
        assert!(result.truncated);
        assert_eq!(result.rows[2]["id"], 2);
    }

    #[test]
    fn test_rows_exactly_at_cap_not_truncated() {
        let result = ExecutionResult::from_rows(vec!["id".to_string()], rows(3), 3);
        assert_eq!(result.row_count, 3);
        assert!(!result.truncated);
    }

    #[test]
    fn test_affected_has_no_rows() {
        let result = ExecutionResult::affected(7);
        assert!(result.rows.is_empty());
        assert!(result.columns.is_empty());
        assert!(!result.truncated);
        assert_eq!(
            result.message.as_deref(),
            Some("Query executed successfully. 7 rows affected.")
        );
    }

    #[test]
    fn test_explain_result_shapes() {
        let plan = serde_json::to_value(ExplainResult::Plan(json!([{"Plan": {}}]))).unwrap();
        assert_eq!(plan["success"], true);
        assert!(plan.get("plan").is_some());
        assert!(plan.get("error").is_none());

        let failure = serde_json::to_value(ExplainResult::Failure("no plan".into())).unwrap();
        assert_eq!(failure["success"], false);
        assert_eq!(failure["error"], "no plan");
        assert!(failure.get("plan").is_none());
    }

    #[test]
    fn test_missing_table_stats_serialize_without_details() {
        let stats = TableStats {
            found: false,
            schema: "public".into(),
            table_name: "ghost".into(),
            details: None,
        };
        let value = serde_json::to_value(stats).unwrap();
        assert_eq!(value["found"], false);
        assert!(value.get("row_count").is_none());
    }

    #[test]
    fn test_gateway_error_kinds() {
        let err: GatewayError = ValidationError::EmptyQuery.into();
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "Query cannot be empty");
        assert_eq!(GatewayError::Execution("boom".into()).kind(), "execution");
        assert_eq!(GatewayError::Pool("refused".into()).kind(), "pool");
    }
}
