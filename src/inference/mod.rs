//! Inference Client — OpenAI-compatible chat completions API client.
//!
//! This module handles all communication with the model endpoint:
//! - Non-streaming chat completions with a tool catalog attached
//! - Parsing of final answers and native JSON tool calls
//!
//! The conversation loop depends only on the [`ChatModel`] trait, so the
//! endpoint is interchangeable via config.

pub mod client;
pub mod errors;
pub mod types;

// Re-exports for convenience
pub use client::{ChatModel, InferenceClient};
pub use errors::InferenceError;
pub use types::{ChatMessage, ModelReply, Role, ToolCall, ToolDefinition};
