//! End-to-end tests against the real `weather-server` binary over stdio.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use weather_agent::agent_core::WeatherAgent;
use weather_agent::config::AppConfig;
use weather_agent::inference::errors::InferenceError;
use weather_agent::inference::types::{ChatMessage, ModelReply, ToolCall, ToolDefinition};
use weather_agent::inference::ChatModel;
use weather_agent::mcp_client::types::{result_is_error, result_text};
use weather_agent::mcp_client::{
    McpError, McpSession, RetryPolicy, SessionOptions, ToolCatalog, ToolInvoker, ToolSession,
};

const SERVER: &str = env!("CARGO_BIN_EXE_weather-server");

/// Simulated provider, logs in `dir`.
fn options(dir: &Path) -> SessionOptions {
    let env = HashMap::from([
        ("QWEATHER_API_KEY".to_string(), String::new()),
        ("QWEATHER_API_BASE".to_string(), String::new()),
        (
            "AGENT_LOG_FILE".to_string(),
            dir.join("server.log").to_string_lossy().into_owned(),
        ),
    ]);
    SessionOptions {
        env,
        ..SessionOptions::default()
    }
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[tokio::test]
async fn test_connect_discover_call_close() {
    let dir = tempfile::tempdir().unwrap();
    let session = McpSession::connect("weather", Path::new(SERVER), &options(dir.path()))
        .await
        .unwrap();
    assert!(session.is_ready());
    assert_eq!(
        session.server_info().and_then(|i| i.name.as_deref()),
        Some("weather")
    );

    let catalog = ToolCatalog::discover(&session).await.unwrap();
    assert_eq!(
        catalog.names(),
        vec!["get_weather_warning", "get_daily_forecast"]
    );

    let invoker = ToolInvoker::new(RetryPolicy::once());
    let forecast = invoker
        .execute(
            &session,
            "get_daily_forecast",
            &serde_json::json!({"location": "北京", "days": 3}),
        )
        .await
        .unwrap();
    assert!(!result_is_error(&forecast));
    assert_eq!(result_text(&forecast).matches("\n---\n").count(), 2);

    let unknown_city = invoker
        .execute(
            &session,
            "get_weather_warning",
            &serde_json::json!({"location": "Atlantis"}),
        )
        .await
        .unwrap();
    assert!(result_is_error(&unknown_city));

    let pid = session.pid().unwrap();
    session.close().await;
    session.close().await;
    assert!(!session.is_ready());
    #[cfg(target_os = "linux")]
    assert!(!process_alive(pid), "server process {pid} still running");

    let err = session
        .call_tool("get_daily_forecast", &serde_json::json!({"location": "101010100"}))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::NotInitialized { .. }));
}

#[tokio::test]
async fn test_initialize_then_close_leaves_no_process() {
    let dir = tempfile::tempdir().unwrap();
    for _ in 0..3 {
        let session = McpSession::connect("weather", Path::new(SERVER), &options(dir.path()))
            .await
            .unwrap();
        let pid = session.pid().unwrap();
        session.close().await;
        #[cfg(target_os = "linux")]
        assert!(!process_alive(pid));
        let _ = pid;
    }
}

/// Asks for the Beijing forecast once, then answers with the tool output.
struct ForecastModel;

#[async_trait]
impl ChatModel for ForecastModel {
    fn model_name(&self) -> &str {
        "forecast-model"
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ModelReply, InferenceError> {
        match messages.last() {
            Some(last) if last.tool_call_id.is_some() => {
                Ok(ModelReply::text(format!("Forecast:\n{}", last.text())))
            }
            _ => Ok(ModelReply::tool_calls(vec![ToolCall::new(
                "call_1",
                "get_daily_forecast",
                serde_json::json!({"location": "101010100", "days": 3}),
            )])),
        }
    }
}

#[tokio::test]
async fn test_agent_answers_through_real_server() {
    let dir = tempfile::tempdir().unwrap();
    let session = McpSession::connect("weather", Path::new(SERVER), &options(dir.path()))
        .await
        .unwrap();

    let agent = WeatherAgent::new(AppConfig::default(), Arc::new(ForecastModel));
    agent.initialize_with(Arc::new(session)).await.unwrap();

    let outcome = agent.ask_detailed("Beijing weather?").await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(outcome.rounds, 1);
    assert!(outcome.answer.starts_with("Forecast:\n"));
    assert!(outcome.answer.len() > "Forecast:\n".len());

    agent.cleanup().await;
    agent.cleanup().await;
    assert!(!agent.is_initialized().await);
}
