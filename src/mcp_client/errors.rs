//! MCP Client error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// None of the candidate server paths exist on disk.
    #[error("MCP server not found (checked: {})", display_paths(candidates))]
    NotFound {
        candidates: Vec<PathBuf>,
    },

    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed {
        name: String,
        reason: String,
    },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed {
        name: String,
        reason: String,
    },

    /// JSON-RPC communication error (malformed message, I/O error, closed pipe).
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// A request did not receive a response within its deadline.
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout {
        method: String,
        timeout_ms: u64,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// An operation was attempted on a session that is not connected.
    #[error("session not initialized: {operation} requires a connected server")]
    NotInitialized {
        operation: String,
    },

    /// Tool not found in the discovered catalog.
    #[error("unknown tool: '{name}'")]
    UnknownTool {
        name: String,
    },

    /// Tool call arguments failed schema validation.
    #[error("invalid arguments for '{tool}': {reason}")]
    InvalidArguments {
        tool: String,
        reason: String,
    },

    /// The server answered with a payload the client does not understand.
    #[error("unexpected response to '{method}': {reason}")]
    UnexpectedResponse {
        method: String,
        reason: String,
    },

    /// A tool invocation failed after its retry budget was spent.
    #[error("tool '{tool}' failed after {attempts} attempt(s): {cause}")]
    ToolExecution {
        tool: String,
        attempts: u32,
        cause: Box<McpError>,
    },
}

impl McpError {
    /// Spawn, handshake, and channel failures: the retryable connection class.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            McpError::SpawnFailed { .. }
                | McpError::InitFailed { .. }
                | McpError::TransportError { .. }
        )
    }

    /// Whether a tool invocation that failed with this error may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            McpError::TransportError { .. } | McpError::Timeout { .. }
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_lists_every_candidate() {
        let err = McpError::NotFound {
            candidates: vec![PathBuf::from("/a/server"), PathBuf::from("/b/server.py")],
        };
        let msg = err.to_string();
        assert!(msg.contains("/a/server"));
        assert!(msg.contains("/b/server.py"));
    }

    #[test]
    fn test_connection_error_class() {
        assert!(McpError::SpawnFailed {
            name: "weather".into(),
            reason: "no such file".into()
        }
        .is_connection_error());
        assert!(McpError::InitFailed {
            name: "weather".into(),
            reason: "bad handshake".into()
        }
        .is_connection_error());
        assert!(!McpError::NotFound { candidates: vec![] }.is_connection_error());
    }

    #[test]
    fn test_transient_classification() {
        assert!(McpError::Timeout {
            method: "tools/call".into(),
            timeout_ms: 10
        }
        .is_transient());
        assert!(!McpError::ServerError {
            code: -32602,
            message: "unknown tool".into(),
            data: None
        }
        .is_transient());
        assert!(!McpError::NotInitialized {
            operation: "tools/call".into()
        }
        .is_transient());
    }
}
