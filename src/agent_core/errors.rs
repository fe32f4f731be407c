//! Agent Core error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::inference::InferenceError;
use crate::mcp_client::McpError;

/// Errors that can occur during agent core operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// An operation was invoked before `initialize()` succeeded.
    #[error("agent not initialized: call initialize() before {operation}")]
    NotInitialized { operation: String },

    /// A conversation loop event arrived in the wrong state.
    #[error("invalid conversation state: expected {expected}, was {actual}")]
    InvalidState { expected: String, actual: String },

    /// Connection, discovery, or tool failure from the MCP layer.
    #[error(transparent)]
    Mcp(#[from] McpError),

    /// Model endpoint failure.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// Missing or invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
