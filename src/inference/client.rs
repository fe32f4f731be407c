//! OpenAI-compatible inference client.
//!
//! Sends non-streaming chat completion requests with the tool catalog
//! attached and turns the response into a [`ModelReply`]. The conversation
//! loop only sees the [`ChatModel`] trait, so tests can script replies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::ModelConfig;

use super::errors::InferenceError;
use super::types::{ChatCompletionRequest, ChatMessage, ModelReply, ToolCall, ToolDefinition};

// ─── ChatModel ───────────────────────────────────────────────────────────────

/// A model that can take a conversation plus a tool catalog and decide what
/// to do next.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, InferenceError>;
}

// ─── InferenceClient ─────────────────────────────────────────────────────────

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct InferenceClient {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout: Duration,
}

impl InferenceClient {
    /// Build a client. Does NOT check connectivity; that happens on the
    /// first request.
    pub fn from_config(config: &ModelConfig) -> Result<Self, InferenceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| InferenceError::ConfigError {
                reason: "model API key is not set".into(),
            })?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let http = HttpClient::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(timeout)
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl ChatModel for InferenceClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, InferenceError> {
        let url = format!("{}/chat/completions", self.base_url);
        let has_tools = !tools.is_empty();

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tools: has_tools.then(|| tools.to_vec()),
            tool_choice: has_tools.then(|| "auto".to_string()),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "chat completion request"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout {
                        duration_secs: self.timeout.as_secs(),
                    }
                } else {
                    InferenceError::ConnectionFailed {
                        endpoint: url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response.text().await.map_err(|e| InferenceError::ResponseError {
            reason: format!("failed to read response body: {e}"),
        })?;

        let reply = parse_completion_response(&body_text)?;
        tracing::debug!(
            finish_reason = ?reply.finish_reason,
            tool_calls = reply.tool_calls.len(),
            "chat completion response"
        );
        Ok(reply)
    }
}

// ─── Response Parsing ────────────────────────────────────────────────────────

/// Parse a non-streaming chat completion body.
///
/// The finish reason is passed through untouched; deciding what it means is
/// the conversation loop's job. Tool-call arguments must be JSON text; an
/// empty string is read as `{}`.
pub fn parse_completion_response(body: &str) -> Result<ModelReply, InferenceError> {
    #[derive(Deserialize)]
    struct CompletionResponse {
        choices: Vec<CompletionChoice>,
    }

    #[derive(Deserialize)]
    struct CompletionChoice {
        message: CompletionMessage,
        finish_reason: Option<String>,
    }

    #[derive(Deserialize)]
    struct CompletionMessage {
        content: Option<String>,
        tool_calls: Option<Vec<CompletionToolCall>>,
    }

    #[derive(Deserialize)]
    struct CompletionToolCall {
        id: Option<String>,
        function: CompletionFunction,
    }

    #[derive(Deserialize)]
    struct CompletionFunction {
        name: String,
        #[serde(default)]
        arguments: String,
    }

    let resp: CompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::ResponseError {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::ResponseError {
            reason: "empty choices array".into(),
        })?;

    let content = choice.message.content.filter(|c| !c.is_empty());

    let mut tool_calls = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        let id = tc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
        let raw = tc.function.arguments;
        let arguments = if raw.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&raw).map_err(|e| InferenceError::ToolCallParseError {
                raw_response: raw.clone(),
                reason: format!("invalid JSON arguments for '{}': {e}", tc.function.name),
            })?
        };
        tool_calls.push(ToolCall {
            id,
            name: tc.function.name,
            arguments,
        });
    }

    Ok(ModelReply {
        content,
        tool_calls,
        finish_reason: choice.finish_reason,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_final_answer() {
        let body = r#"{
            "choices": [{
                "message": {"role": "assistant", "content": "Sunny all week."},
                "finish_reason": "stop"
            }]
        }"#;
        let reply = parse_completion_response(body).unwrap();
        assert_eq!(reply.content.as_deref(), Some("Sunny all week."));
        assert!(reply.tool_calls.is_empty());
        assert_eq!(reply.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_parse_tool_calls_in_order() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_a", "type": "function",
                         "function": {"name": "get_weather_warning", "arguments": "{\"location\":\"101010100\"}"}},
                        {"id": "call_b", "type": "function",
                         "function": {"name": "get_daily_forecast", "arguments": "{\"location\":\"101010100\",\"days\":3}"}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let reply = parse_completion_response(body).unwrap();
        assert!(reply.content.is_none());
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].id, "call_a");
        assert_eq!(reply.tool_calls[1].arguments["days"], 3);
    }

    #[test]
    fn test_missing_call_id_is_generated() {
        let body = r#"{"choices": [{"message": {"tool_calls": [
            {"function": {"name": "get_daily_forecast", "arguments": ""}}
        ]}, "finish_reason": "tool_calls"}]}"#;
        let reply = parse_completion_response(body).unwrap();
        assert!(reply.tool_calls[0].id.starts_with("call_"));
        assert_eq!(reply.tool_calls[0].arguments, serde_json::json!({}));
    }

    #[test]
    fn test_invalid_arguments_are_parse_error() {
        let body = r#"{"choices": [{"message": {"tool_calls": [
            {"id": "x", "function": {"name": "get_daily_forecast", "arguments": "{location:"}}
        ]}, "finish_reason": "tool_calls"}]}"#;
        assert!(matches!(
            parse_completion_response(body),
            Err(InferenceError::ToolCallParseError { .. })
        ));
    }

    #[test]
    fn test_unknown_finish_reason_passes_through() {
        let body = r#"{"choices": [{"message": {"content": "trunc"}, "finish_reason": "length"}]}"#;
        let reply = parse_completion_response(body).unwrap();
        assert_eq!(reply.finish_reason.as_deref(), Some("length"));
    }

    #[test]
    fn test_empty_choices() {
        assert!(matches!(
            parse_completion_response(r#"{"choices": []}"#),
            Err(InferenceError::ResponseError { .. })
        ));
    }

    #[test]
    fn test_client_requires_api_key() {
        let config = ModelConfig::default();
        assert!(matches!(
            InferenceClient::from_config(&config),
            Err(InferenceError::ConfigError { .. })
        ));

        let config = ModelConfig {
            api_key: Some("sk-test".into()),
            base_url: "http://localhost:8080/v1/".into(),
            ..ModelConfig::default()
        };
        let client = InferenceClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
        assert_eq!(client.model_name(), "gpt-4o");
    }
}
