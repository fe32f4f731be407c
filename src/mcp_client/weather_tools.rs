//! Direct access to the weather tools, without a model in the loop.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::weather::location::resolve_locally;
use crate::weather::server::{normalize_days, TOOL_DAILY_FORECAST, TOOL_WEATHER_WARNING};

use super::discovery::resolve_server_target;
use super::errors::McpError;
use super::invoker::ToolInvoker;
use super::session::{McpSession, ToolSession};
use super::types::result_text;

/// Thin client over a weather tool session.
pub struct WeatherToolsClient {
    session: Option<Arc<dyn ToolSession>>,
    invoker: ToolInvoker,
}

impl WeatherToolsClient {
    /// A disconnected client using the configured tool retry policy.
    pub fn new(config: &AppConfig) -> Self {
        Self {
            session: None,
            invoker: ToolInvoker::new(config.agent.tool_retry.policy()),
        }
    }

    /// Wrap an already-connected session.
    pub fn with_session(session: Arc<dyn ToolSession>, invoker: ToolInvoker) -> Self {
        Self {
            session: Some(session),
            invoker,
        }
    }

    /// Resolve the server target and connect.
    pub async fn connect(&mut self, config: &AppConfig) -> Result<(), McpError> {
        if self.session.is_some() {
            return Ok(());
        }
        let target = resolve_server_target(&config.server.candidates())?;
        let session = McpSession::connect_with_retry(
            "weather",
            &target,
            &config.server.session_options(&config.weather),
            &config.server.connect_retry.policy(),
        )
        .await?;
        self.session = Some(Arc::new(session));
        Ok(())
    }

    /// Close the session. Safe to call when never connected.
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_ready())
    }

    /// Daily forecast text. Unsupported `days` fall back to 3.
    pub async fn get_daily_forecast(&self, location: &str, days: u32) -> Result<String, McpError> {
        let days = normalize_days(Some(i64::from(days)));
        let arguments = serde_json::json!({
            "location": resolve_locally(location),
            "days": days,
        });
        self.call(TOOL_DAILY_FORECAST, &arguments).await
    }

    /// Active weather warnings text.
    pub async fn get_weather_warning(&self, location: &str) -> Result<String, McpError> {
        let arguments = serde_json::json!({ "location": resolve_locally(location) });
        self.call(TOOL_WEATHER_WARNING, &arguments).await
    }

    async fn call(&self, tool: &str, arguments: &serde_json::Value) -> Result<String, McpError> {
        let session = self.session.as_ref().ok_or_else(|| McpError::NotInitialized {
            operation: format!("tool call '{tool}'"),
        })?;
        let result = self.invoker.execute(session.as_ref(), tool, arguments).await?;
        Ok(result_text(&result))
    }
}

/// Connect, fetch one forecast, and close, whatever happens in between.
pub async fn fetch_forecast(config: &AppConfig, location: &str, days: u32) -> Result<String, McpError> {
    tracing::info!(location, days, "fetching forecast via MCP");
    let mut client = WeatherToolsClient::new(config);

    let result = match client.connect(config).await {
        Ok(()) => client.get_daily_forecast(location, days).await,
        Err(e) => Err(e),
    };
    client.close().await;

    if let Err(e) = &result {
        tracing::error!(error = %e, "forecast via MCP failed");
    }
    result
}

// ─── Tests ───────────────────────────────────────────────────────────────────
