//! Result helpers for MCP tool responses
//!
//! Success and failure bodies are both JSON objects so clients can parse
//! every response the same way.

use rmcp::model::{CallToolResult, Content};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{internal_error, McpResult, ToolError};

/// Create a successful JSON response from any serializable data
///
/// ```rust,ignore
/// fn my_tool(&self) -> Result<CallToolResult, McpError> {
///     json_success(&MyData { value: 42 })
/// }
/// ```
pub fn json_success<T: Serialize>(data: &T) -> McpResult<CallToolResult> {
    let json = serde_json::to_string_pretty(data).map_err(|e| internal_error(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// The JSON body carried by an error-flagged tool result
pub fn error_payload(kind: &str, message: &str) -> Value {
    json!({
        "error": message,
        "kind": kind,
    })
}

/// Create an error-flagged response with an `{ "error", "kind" }` body
pub fn json_error(kind: &str, message: impl AsRef<str>) -> CallToolResult {
    let body = error_payload(kind, message.as_ref());
    // Serializing a two-field object of strings cannot fail.
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    CallToolResult::error(vec![Content::text(text)])
}

/// Create an error-flagged response from a classified domain error
pub fn tool_failure<E: ToolError>(err: &E) -> CallToolResult {
    json_error(err.kind(), err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Listing {
        schema: String,
        tables: usize,
    }

    #[derive(Debug, thiserror::Error)]
    #[error("connection refused")]
    struct Refused;

    impl ToolError for Refused {
        fn kind(&self) -> &'static str {
            "execution"
        }
    }

    fn body_of(result: &CallToolResult) -> Value {
        let text = &result.content[0].as_text().unwrap().text;
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn test_json_success() {
        let data = Listing {
            schema: "public".to_string(),
            tables: 3,
        };
        let result = json_success(&data).unwrap();
        assert!(!result.is_error.unwrap_or(false));
        assert_eq!(body_of(&result)["tables"], 3);
    }

    #[test]
    fn test_json_error_has_error_field() {
        let result = json_error("validation", "Query cannot be empty");
        assert_eq!(result.is_error, Some(true));
        let body = body_of(&result);
        assert_eq!(body["error"], "Query cannot be empty");
        assert_eq!(body["kind"], "validation");
    }

    #[test]
    fn test_tool_failure_uses_kind() {
        let result = tool_failure(&Refused);
        let body = body_of(&result);
        assert_eq!(body["kind"], "execution");
        assert_eq!(body["error"], "connection refused");
    }
}
