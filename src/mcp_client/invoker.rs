//! Tool invoker — runs one named tool against the active session with
//! bounded retry on transient failures.
//!
//! The invoker does not interpret tool output. A successful call returns the
//! raw `tools/call` result payload; a failure that outlives the retry budget
//! comes back as [`McpError::ToolExecution`].

use super::errors::McpError;
use super::retry::{retry, RetryPolicy};
use super::session::ToolSession;

/// Executes tool calls under a fixed retry policy.
#[derive(Debug, Clone)]
pub struct ToolInvoker {
    policy: RetryPolicy,
}

impl ToolInvoker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `name` with `arguments`.
    ///
    /// Transport errors and timeouts are retried after the policy delay, up
    /// to `max_attempts` total attempts. Any other failure ends the call
    /// immediately. Either way the final error is wrapped in `ToolExecution`.
    pub async fn execute(
        &self,
        session: &dyn ToolSession,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        if !session.is_ready() {
            return Err(McpError::NotInitialized {
                operation: format!("tool call '{name}'"),
            });
        }

        let max_attempts = self.policy.max_attempts();
        let outcome = retry(&self.policy, "tool_call", McpError::is_transient, |attempt| {
            tracing::info!(
                tool = name,
                attempt,
                max_attempts,
                arguments = %arguments,
                "executing tool"
            );
            session.call_tool(name, arguments)
        })
        .await;

        match outcome {
            Ok(result) => Ok(result),
            Err(failure) => {
                tracing::error!(
                    tool = name,
                    attempts = failure.attempts,
                    error = %failure.error,
                    "tool execution failed"
                );
                Err(McpError::ToolExecution {
                    tool: name.to_string(),
                    attempts: failure.attempts,
                    cause: Box::new(failure.error),
                })
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::McpToolDefinition;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails with the given error for the first `failures` calls, then succeeds.
    struct FlakySession {
        failures: u32,
        error: fn() -> McpError,
        calls: AtomicU32,
        ready: AtomicBool,
    }

    impl FlakySession {
        fn new(failures: u32, error: fn() -> McpError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
                ready: AtomicBool::new(true),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolSession for FlakySession {
        fn name(&self) -> &str {
            "flaky"
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
            Ok(vec![])
        }

        async fn call_tool(
            &self,
            name: &str,
            _arguments: &serde_json::Value,
        ) -> Result<serde_json::Value, McpError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n <= self.failures {
                Err((self.error)())
            } else {
                Ok(serde_json::json!({
                    "content": [{"type": "text", "text": format!("{name} ok on call {n}")}]
                }))
            }
        }

        async fn close(&self) {
            self.ready.store(false, Ordering::SeqCst);
        }
    }

    fn transport_error() -> McpError {
        McpError::TransportError {
            server: "flaky".into(),
            reason: "broken pipe".into(),
        }
    }

    fn server_error() -> McpError {
        McpError::ServerError {
            code: -32602,
            message: "bad params".into(),
            data: None,
        }
    }

    fn invoker(max_attempts: u32) -> ToolInvoker {
        ToolInvoker::new(RetryPolicy::new(max_attempts, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_succeeds_after_n_minus_one_transient_failures() {
        for n in 1..=4 {
            let session = FlakySession::new(n - 1, transport_error);
            let result = invoker(n)
                .execute(&session, "get_daily_forecast", &serde_json::json!({"location": "101010100"}))
                .await
                .unwrap();

            assert_eq!(session.calls(), n);
            assert_eq!(
                result["content"][0]["text"],
                format!("get_daily_forecast ok on call {n}")
            );
        }
    }

    #[tokio::test]
    async fn test_exhausts_exactly_n_attempts() {
        for n in 1..=4 {
            let session = FlakySession::new(u32::MAX, transport_error);
            let err = invoker(n)
                .execute(&session, "get_weather_warning", &serde_json::json!({}))
                .await
                .unwrap_err();

            assert_eq!(session.calls(), n, "attempts for policy of {n}");
            match err {
                McpError::ToolExecution { tool, attempts, cause } => {
                    assert_eq!(tool, "get_weather_warning");
                    assert_eq!(attempts, n);
                    assert!(matches!(*cause, McpError::TransportError { .. }));
                }
                other => panic!("expected ToolExecution, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let session = FlakySession::new(u32::MAX, server_error);
        let err = invoker(3)
            .execute(&session, "get_daily_forecast", &serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(session.calls(), 1);
        assert!(matches!(err, McpError::ToolExecution { attempts: 1, .. }));
    }

    #[tokio::test]
    async fn test_requires_ready_session() {
        let session = FlakySession::new(0, transport_error);
        session.close().await;

        let err = invoker(3)
            .execute(&session, "get_daily_forecast", &serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::NotInitialized { .. }));
        assert_eq!(session.calls(), 0);
    }

    #[tokio::test]
    async fn test_tool_level_error_payload_passes_through() {
        struct ErrorPayloadSession;

        #[async_trait]
        impl ToolSession for ErrorPayloadSession {
            fn name(&self) -> &str {
                "payload"
            }
            fn is_ready(&self) -> bool {
                true
            }
            async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
                Ok(vec![])
            }
            async fn call_tool(
                &self,
                _name: &str,
                _arguments: &serde_json::Value,
            ) -> Result<serde_json::Value, McpError> {
                Ok(serde_json::json!({
                    "content": [{"type": "text", "text": "unknown city"}],
                    "isError": true
                }))
            }
            async fn close(&self) {}
        }

        let result = invoker(2)
            .execute(&ErrorPayloadSession, "get_daily_forecast", &serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result["isError"], true);
    }
}
