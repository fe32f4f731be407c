//! MCP Client — JSON-RPC over stdio transport to the weather tool server.
//!
//! This module handles:
//! - Locating the server target and spawning it as a child process
//! - JSON-RPC 2.0 communication over process stdio
//! - The initialization handshake and graceful shutdown
//! - Tool discovery and conversion to the model's function format
//! - Tool execution with bounded retry
//!
//! The conversation loop in `agent_core` drives tool calls through the
//! [`ToolInvoker`] against a [`ToolSession`].

pub mod catalog;
pub mod discovery;
pub mod errors;
pub mod invoker;
pub mod retry;
pub mod session;
pub mod transport;
pub mod types;
pub mod weather_tools;

// Re-exports for convenience
pub use catalog::{ToolCatalog, ToolDescriptor};
pub use errors::McpError;
pub use invoker::ToolInvoker;
pub use retry::{RetryPolicy, RetrySettings};
pub use session::{McpSession, SessionOptions, ToolSession};
pub use types::McpToolDefinition;
pub use weather_tools::{fetch_forecast, WeatherToolsClient};
