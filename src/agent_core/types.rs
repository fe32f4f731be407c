//! Shared types for the agent core.

use serde::{Deserialize, Serialize};

/// Outcome of one tool call, ready to be folded into history.
///
/// Exactly one result exists per requested call; `call_id` ties it back to
/// the model's request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    /// Text the model will see in the `tool` message.
    pub output: String,
    /// The call failed, or the tool flagged its own result as an error.
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn success(call_id: impl Into<String>, tool_name: impl Into<String>, output: String) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output,
            is_error: false,
        }
    }

    pub fn error(call_id: impl Into<String>, tool_name: impl Into<String>, output: String) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            output,
            is_error: true,
        }
    }
}
