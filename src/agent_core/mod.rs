//! Agent Core — conversation orchestration for the weather agent.
//!
//! Submodules:
//! - `client`: The `WeatherAgent` facade (initialize / ask / cleanup)
//! - `agent_loop`: Model/tool state machine for one query
//! - `conversation`: Append-only conversation history
//! - `tool_router`: Dispatches model tool calls to the tool session
//! - `prompts`: System prompt built from the discovered tools
//! - `types`: Shared types across the agent core
//! - `errors`: Agent-level error types

pub mod agent_loop;
pub mod client;
pub mod conversation;
pub mod errors;
pub mod prompts;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use agent_loop::{
    AbortReason, ConversationLoop, ConversationOutcome, LoopState, LoopStatus, ModelDecision,
};
pub use client::WeatherAgent;
pub use conversation::ConversationHistory;
pub use errors::AgentError;
pub use tool_router::ToolRouter;
pub use types::ToolCallResult;
