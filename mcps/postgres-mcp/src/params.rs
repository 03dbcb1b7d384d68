//! Parameter types for PostgreSQL MCP tools

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

fn default_schema() -> String {
    "public".to_string()
}

/// Accept a limit as a JSON number or numeric string.
///
/// Anything else becomes `1`: a limit can only narrow the result, so an
/// unreadable one narrows it as far as possible instead of failing the call.
fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(limit_from_json(value.as_ref()))
}

pub fn limit_from_json(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Null => None,
        Value::Number(n) => Some(
            n.as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(1),
        ),
        Value::String(s) => Some(s.trim().parse().unwrap_or(1)),
        _ => Some(1),
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct QueryParams {
    #[schemars(
        description = "SQL to execute. Read-only servers accept SELECT, WITH, EXPLAIN, SHOW, DESCRIBE and SET; comments and stacked destructive statements are always rejected"
    )]
    pub sql: String,

    #[schemars(description = "Positional values for $1, $2, ... placeholders")]
    #[serde(default)]
    pub params: Vec<Value>,

    #[schemars(description = "Maximum rows to return (optional, capped at the server's MAX_ROWS)")]
    #[schemars(with = "Option<i64>")]
    #[serde(default, deserialize_with = "lenient_limit")]
    pub max_rows: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ExplainParams {
    #[schemars(description = "Read-only query to explain")]
    pub sql: String,

    #[schemars(
        description = "Run EXPLAIN ANALYZE (executes the query to collect real timings; default false)"
    )]
    #[serde(default)]
    pub analyze: bool,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SchemaParams {
    #[schemars(description = "Schema name (defaults to public)")]
    #[serde(default = "default_schema")]
    pub schema: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TableParams {
    #[schemars(description = "Table name")]
    pub table_name: String,

    #[schemars(description = "Schema name (defaults to public)")]
    #[serde(default = "default_schema")]
    pub schema: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ViewParams {
    #[schemars(description = "View name")]
    pub view_name: String,

    #[schemars(description = "Schema name (defaults to public)")]
    #[serde(default = "default_schema")]
    pub schema: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchColumnsParams {
    #[schemars(description = "Substring to look for in column names (case-insensitive, matched literally)")]
    pub search_term: String,

    #[schemars(description = "Restrict the search to one schema (optional)")]
    #[serde(default)]
    pub schema: Option<String>,

    #[schemars(description = "Maximum matches to return (optional, capped at the server's MAX_ROWS)")]
    #[schemars(with = "Option<i64>")]
    #[serde(default, deserialize_with = "lenient_limit")]
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_defaults_to_public() {
        let params: TableParams = serde_json::from_value(json!({"table_name": "orders"})).unwrap();
        assert_eq!(params.schema, "public");

        let params: SchemaParams = serde_json::from_value(json!({})).unwrap();
        assert_eq!(params.schema, "public");
    }

    #[test]
    fn test_query_params_defaults() {
        let params: QueryParams = serde_json::from_value(json!({"sql": "SELECT 1"})).unwrap();
        assert!(params.params.is_empty());
        assert_eq!(params.max_rows, None);
    }

    #[test]
    fn test_lenient_limits() {
        let params: SearchColumnsParams =
            serde_json::from_value(json!({"search_term": "id", "limit": "25"})).unwrap();
        assert_eq!(params.limit, Some(25));

        let params: SearchColumnsParams =
            serde_json::from_value(json!({"search_term": "id", "limit": "lots"})).unwrap();
        assert_eq!(params.limit, Some(1));

        let params: QueryParams =
            serde_json::from_value(json!({"sql": "SELECT 1", "max_rows": null})).unwrap();
        assert_eq!(params.max_rows, None);
    }

    #[test]
    fn test_limit_from_json() {
        assert_eq!(limit_from_json(None), None);
        assert_eq!(limit_from_json(Some(&json!(10))), Some(10));
        assert_eq!(limit_from_json(Some(&json!(-5))), Some(-5));
        assert_eq!(limit_from_json(Some(&json!(2.9))), Some(2));
        assert_eq!(limit_from_json(Some(&json!([1]))), Some(1));
    }

    #[test]
    fn test_missing_required_field_rejected() {
        assert!(serde_json::from_value::<ViewParams>(json!({"schema": "public"})).is_err());
    }
}
