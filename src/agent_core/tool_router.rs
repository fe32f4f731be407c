//! ToolRouter — dispatches model tool calls to the tool session.
//!
//! The ToolRouter is the bridge between the model's tool call decisions and
//! the MCP server. It handles:
//! - Validation (tool exists, required arguments present)
//! - Execution via the [`ToolInvoker`] (with its retry policy)
//! - Turning every outcome, including failures, into a [`ToolCallResult`]
//!
//! Failures never escape as errors: the model sees them as error-flagged tool
//! results and can react on its next turn.

use std::time::Instant;

use crate::inference::types::ToolCall;
use crate::mcp_client::catalog::ToolCatalog;
use crate::mcp_client::invoker::ToolInvoker;
use crate::mcp_client::session::ToolSession;
use crate::mcp_client::types::{result_is_error, result_text};

use super::types::ToolCallResult;

/// Suffix appended to tool output cut at the length limit.
const TRUNCATION_MARKER: &str = "\n...[truncated]";

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Dispatches tool calls from the model to the active session.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    invoker: ToolInvoker,
    /// Tool output longer than this many characters is truncated.
    max_result_chars: usize,
}

impl ToolRouter {
    pub fn new(invoker: ToolInvoker, max_result_chars: usize) -> Self {
        Self {
            invoker,
            max_result_chars,
        }
    }

    /// Dispatch a batch of tool calls from the model.
    ///
    /// Calls run sequentially, in the order given: each completes before the
    /// next starts. Returns one result per call, in the same order.
    pub async fn dispatch_tool_calls(
        &self,
        tool_calls: &[ToolCall],
        session: &dyn ToolSession,
        catalog: &ToolCatalog,
    ) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for tc in tool_calls {
            results.push(self.dispatch_single(tc, session, catalog).await);
        }
        results
    }

    /// Validate and execute one call.
    pub async fn dispatch_single(
        &self,
        tool_call: &ToolCall,
        session: &dyn ToolSession,
        catalog: &ToolCatalog,
    ) -> ToolCallResult {
        let start = Instant::now();

        if let Err(e) = catalog.validate_call(&tool_call.name, &tool_call.arguments) {
            tracing::warn!(tool = %tool_call.name, error = %e, "tool call rejected");
            return ToolCallResult::error(
                &tool_call.id,
                &tool_call.name,
                format!("Error executing tool {}: {e}", tool_call.name),
            );
        }

        match self
            .invoker
            .execute(session, &tool_call.name, &tool_call.arguments)
            .await
        {
            Ok(result) => {
                let is_error = result_is_error(&result);
                let text = if is_error {
                    format!("Error executing tool {}: {}", tool_call.name, result_text(&result))
                } else {
                    result_text(&result)
                };
                let output = truncate_chars(&text, self.max_result_chars);
                tracing::info!(
                    tool = %tool_call.name,
                    call_id = %tool_call.id,
                    is_error,
                    output_chars = output.chars().count(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool call complete"
                );
                ToolCallResult {
                    call_id: tool_call.id.clone(),
                    tool_name: tool_call.name.clone(),
                    output,
                    is_error,
                }
            }
            Err(e) => {
                tracing::error!(
                    tool = %tool_call.name,
                    call_id = %tool_call.id,
                    error = %e,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool call failed"
                );
                ToolCallResult::error(
                    &tool_call.id,
                    &tool_call.name,
                    format!("Error executing tool {}: {e}", tool_call.name),
                )
            }
        }
    }
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_idx, _)) => format!("{}{TRUNCATION_MARKER}", &text[..byte_idx]),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::conversation::ConversationHistory;
    use crate::mcp_client::catalog::ToolDescriptor;
    use crate::mcp_client::errors::McpError;
    use crate::mcp_client::retry::RetryPolicy;
    use crate::mcp_client::types::McpToolDefinition;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records call order; `get_weather_warning` always fails at transport level.
    #[derive(Default)]
    struct ScriptedSession {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ToolSession for ScriptedSession {
        fn name(&self) -> &str {
            "scripted"
        }
        fn is_ready(&self) -> bool {
            true
        }
        async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
            Ok(vec![])
        }
        async fn call_tool(
            &self,
            name: &str,
            arguments: &serde_json::Value,
        ) -> Result<serde_json::Value, McpError> {
            self.events.lock().unwrap().push(format!("start {name}"));
            tokio::task::yield_now().await;
            self.events.lock().unwrap().push(format!("end {name}"));
            match name {
                "get_weather_warning" => Err(McpError::TransportError {
                    server: "scripted".into(),
                    reason: "pipe closed".into(),
                }),
                "flagged" => Ok(serde_json::json!({
                    "content": [{"type": "text", "text": "bad city"}], "isError": true
                })),
                _ => Ok(serde_json::json!({
                    "content": [{"type": "text", "text": format!("{name} {arguments}")}]
                })),
            }
        }
        async fn close(&self) {}
    }

    fn catalog() -> ToolCatalog {
        let def = |name: &str| {
            ToolDescriptor::from(McpToolDefinition {
                name: name.into(),
                description: None,
                input_schema: serde_json::json!({"type": "object", "required": ["location"]}),
            })
        };
        ToolCatalog::from_descriptors(vec![
            def("get_weather_warning"),
            def("get_daily_forecast"),
            def("flagged"),
        ])
    }

    fn router(max_chars: usize) -> ToolRouter {
        ToolRouter::new(ToolInvoker::new(RetryPolicy::once()), max_chars)
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall::new(id, name, serde_json::json!({"location": "101010100"}))
    }

    #[tokio::test]
    async fn test_sequential_dispatch_preserves_order() {
        let session = ScriptedSession::default();
        let calls = vec![
            call("A", "get_daily_forecast"),
            call("B", "flagged"),
            call("C", "get_daily_forecast"),
        ];

        let results = router(6000)
            .dispatch_tool_calls(&calls, &session, &catalog())
            .await;

        let ids: Vec<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B", "C"]);
        assert_eq!(
            *session.events.lock().unwrap(),
            vec![
                "start get_daily_forecast",
                "end get_daily_forecast",
                "start flagged",
                "end flagged",
                "start get_daily_forecast",
                "end get_daily_forecast",
            ]
        );
        assert!(!results[0].is_error);
        assert!(results[1].is_error);
        assert_eq!(results[1].output, "Error executing tool flagged: bad city");
    }

    #[tokio::test]
    async fn test_flagged_payload_is_marked_in_history() {
        let session = ScriptedSession::default();
        let result = router(6000)
            .dispatch_single(&call("F", "flagged"), &session, &catalog())
            .await;

        let mut history = ConversationHistory::new("system", "weather in Atlantis?");
        history.push_tool_result(&result);
        assert_eq!(
            history.tool_results(),
            vec![("F", "Error executing tool flagged: bad city")]
        );
    }

    #[tokio::test]
    async fn test_execution_failure_is_folded() {
        let session = ScriptedSession::default();
        let result = router(6000)
            .dispatch_single(&call("W", "get_weather_warning"), &session, &catalog())
            .await;

        assert!(result.is_error);
        assert!(result
            .output
            .starts_with("Error executing tool get_weather_warning:"));
        assert!(result.output.contains("pipe closed"));
    }

    #[tokio::test]
    async fn test_validation_failure_skips_execution() {
        let session = ScriptedSession::default();
        let unknown = router(6000)
            .dispatch_single(&call("X", "delete_city"), &session, &catalog())
            .await;
        let missing = router(6000)
            .dispatch_single(
                &ToolCall::new("Y", "get_daily_forecast", serde_json::json!({})),
                &session,
                &catalog(),
            )
            .await;

        assert!(unknown.is_error && unknown.output.contains("unknown tool"));
        assert!(missing.is_error && missing.output.contains("location"));
        assert!(session.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_long_output_is_truncated() {
        let session = ScriptedSession::default();
        let result = router(10)
            .dispatch_single(&call("T", "get_daily_forecast"), &session, &catalog())
            .await;
        assert_eq!(result.output, format!("get_daily_{TRUNCATION_MARKER}"));
    }

    #[test]
    fn test_truncate_chars_respects_multibyte() {
        assert_eq!(truncate_chars("北京天气", 2), format!("北京{TRUNCATION_MARKER}"));
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
