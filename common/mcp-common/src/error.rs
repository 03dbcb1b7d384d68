//! Error classification for tool handlers
//!
//! Protocol-level failures (bad arguments, serialization) stay [`McpError`]s.
//! Domain failures are reported as error-flagged tool results instead, so the
//! caller always receives a JSON body; [`ToolError`] supplies the `kind` tag
//! for that body.

use rmcp::ErrorData as McpError;

/// Result alias for tool handlers
pub type McpResult<T> = Result<T, McpError>;

/// A domain error that can be surfaced to the caller as a tool result.
///
/// The `Display` text becomes the `error` field verbatim, so implementors
/// must keep secrets out of it.
pub trait ToolError: std::error::Error {
    /// Short machine-readable category, e.g. `"validation"`
    fn kind(&self) -> &'static str;
}

/// Create an internal error with a message
pub fn internal_error(message: impl Into<String>) -> McpError {
    McpError::internal_error(message.into(), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("rejected: {0}")]
    struct Rejected(&'static str);

    impl ToolError for Rejected {
        fn kind(&self) -> &'static str {
            "validation"
        }
    }

    #[test]
    fn test_tool_error_kind_and_message() {
        let err = Rejected("comment syntax");
        assert_eq!(err.kind(), "validation");
        assert_eq!(err.to_string(), "rejected: comment syntax");
    }

    #[test]
    fn test_internal_error() {
        let err = internal_error("pool closed");
        assert!(err.message.contains("pool closed"));
    }
}
