//! Conversation history for a single `ask`.
//!
//! The history only grows: messages are appended, never edited or removed.
//! The system prompt sits at index 0 for the whole conversation.

use crate::inference::types::{ChatMessage, Role, ToolCall};

use super::types::ToolCallResult;

/// Ordered, append-only message list.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: Vec<ChatMessage>,
}

impl ConversationHistory {
    /// Start a conversation: `[system, user]`.
    pub fn new(system_prompt: &str, query: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(query)],
        }
    }

    pub fn push_assistant_text(&mut self, text: &str) {
        self.messages.push(ChatMessage::assistant(text));
    }

    /// The assistant turn that requested `calls`.
    pub fn push_assistant_tool_calls(&mut self, content: Option<String>, calls: &[ToolCall]) {
        self.messages
            .push(ChatMessage::assistant_tool_calls(content, calls));
    }

    /// Tool messages carry no error flag on the wire, so error results are
    /// expected to say so in their text (`Error executing tool ...`).
    pub fn push_tool_result(&mut self, result: &ToolCallResult) {
        self.messages
            .push(ChatMessage::tool_result(&result.call_id, &result.output));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Tool-role messages in history order, as `(call_id, content)`.
    pub fn tool_results(&self) -> Vec<(&str, &str)> {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| (m.tool_call_id.as_deref().unwrap_or(""), m.text()))
            .collect()
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_grows_in_order() {
        let mut history = ConversationHistory::new("system rules", "weather in Beijing?");
        assert_eq!(history.len(), 2);
        assert_eq!(history.messages()[0].role, Role::System);
        assert_eq!(history.messages()[1].text(), "weather in Beijing?");

        let call = ToolCall::new("call_1", "get_daily_forecast", serde_json::json!({}));
        history.push_assistant_tool_calls(None, &[call]);
        history.push_tool_result(&ToolCallResult::success(
            "call_1",
            "get_daily_forecast",
            "sunny".into(),
        ));
        history.push_assistant_text("It will be sunny.");

        assert_eq!(history.len(), 5);
        assert_eq!(history.messages()[0].text(), "system rules");
        assert_eq!(history.tool_results(), vec![("call_1", "sunny")]);
        assert_eq!(history.messages()[4].role, Role::Assistant);
    }
}
