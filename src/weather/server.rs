//! MCP stdio server exposing the weather tools.
//!
//! Reads one JSON-RPC message per line from the input stream and writes one
//! response per line to the output stream. Notifications get no response.
//! Tool failures are reported as `isError` results so the calling model can
//! see them; protocol failures become JSON-RPC errors.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp_client::types::{
    error_codes, CallToolResult, JsonRpcError, ListToolsResult, McpToolDefinition,
    PROTOCOL_VERSION,
};

use super::errors::WeatherError;
use super::format::{format_forecast, format_warnings};
use super::location;
use super::provider::WeatherSource;

/// Forecast spans the provider supports.
pub const SUPPORTED_DAYS: [u32; 5] = [3, 7, 10, 15, 30];

/// Span used when the caller gives none or an unsupported one.
pub const DEFAULT_DAYS: u32 = 3;

pub const TOOL_WEATHER_WARNING: &str = "get_weather_warning";
pub const TOOL_DAILY_FORECAST: &str = "get_daily_forecast";

// ─── Wire Types ──────────────────────────────────────────────────────────────

/// Outgoing JSON-RPC response. `id` echoes the request's id verbatim.
#[derive(Debug, Serialize)]
struct JsonRpcReply {
    jsonrpc: &'static str,
    id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

impl JsonRpcReply {
    fn ok(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: serde_json::Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }
}

fn rpc_error(code: i32, message: impl Into<String>) -> JsonRpcError {
    JsonRpcError {
        code,
        message: message.into(),
        data: None,
    }
}

// ─── Tool Definitions ────────────────────────────────────────────────────────

/// The tools this server advertises in `tools/list`.
pub fn tool_definitions() -> Vec<McpToolDefinition> {
    let location_schema = serde_json::json!({
        "type": ["string", "integer"],
        "description": "City id (e.g. '101010100' for Beijing), 'lon,lat' coordinates \
                        (e.g. '116.41,39.92'), or a city name"
    });

    vec![
        McpToolDefinition {
            name: TOOL_WEATHER_WARNING.into(),
            description: Some(
                "Get active weather disaster warnings for a city id or coordinates.".into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "location": location_schema },
                "required": ["location"]
            }),
        },
        McpToolDefinition {
            name: TOOL_DAILY_FORECAST.into(),
            description: Some(
                "Get the daily weather forecast for a city id or coordinates.".into(),
            ),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "location": location_schema,
                    "days": {
                        "type": "integer",
                        "enum": SUPPORTED_DAYS,
                        "default": DEFAULT_DAYS,
                        "description": "Number of forecast days: 3, 7, 10, 15 or 30"
                    }
                },
                "required": ["location"]
            }),
        },
    ]
}

// ─── Argument Helpers ────────────────────────────────────────────────────────

/// `location` may arrive as a string or a bare integer id.
fn location_arg(arguments: &serde_json::Value) -> Option<String> {
    match arguments.get("location")? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validate the requested span, falling back to the default.
pub fn normalize_days(requested: Option<i64>) -> u32 {
    match requested {
        None => DEFAULT_DAYS,
        Some(d) => match u32::try_from(d) {
            Ok(d) if SUPPORTED_DAYS.contains(&d) => d,
            _ => {
                tracing::warn!(requested = d, fallback = DEFAULT_DAYS, "unsupported forecast span");
                DEFAULT_DAYS
            }
        },
    }
}

fn days_arg(arguments: &serde_json::Value) -> Option<i64> {
    match arguments.get("days")? {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ─── WeatherServer ───────────────────────────────────────────────────────────

/// The weather tool server, backed by any [`WeatherSource`].
pub struct WeatherServer {
    source: Box<dyn WeatherSource>,
}

impl WeatherServer {
    pub fn new(source: Box<dyn WeatherSource>) -> Self {
        Self { source }
    }

    /// Serve until the input stream closes.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> std::io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracing::info!(source = self.source.name(), "weather server listening on stdio");
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(mut reply) = self.handle_message(&line).await {
                reply.push('\n');
                writer.write_all(reply.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        tracing::info!("stdin closed, weather server exiting");
        Ok(())
    }

    /// Handle one raw message. Returns the serialized reply, if any.
    pub async fn handle_message(&self, line: &str) -> Option<String> {
        let message: serde_json::Value = match serde_json::from_str(line.trim()) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "malformed JSON-RPC message");
                return encode(JsonRpcReply::err(
                    serde_json::Value::Null,
                    rpc_error(error_codes::PARSE_ERROR, format!("Parse error: {e}")),
                ));
            }
        };

        let id = message.get("id").cloned();
        let Some(method) = message.get("method").and_then(|m| m.as_str()) else {
            return encode(JsonRpcReply::err(
                id.unwrap_or(serde_json::Value::Null),
                rpc_error(error_codes::INVALID_REQUEST, "Invalid Request: missing method"),
            ));
        };
        let params = message
            .get("params")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        let Some(id) = id else {
            tracing::debug!(method, "notification received");
            return None;
        };

        let reply = match self.dispatch(method, &params).await {
            Ok(result) => JsonRpcReply::ok(id, result),
            Err(error) => {
                tracing::warn!(method, code = error.code, message = %error.message, "request failed");
                JsonRpcReply::err(id, error)
            }
        };
        encode(reply)
    }

    async fn dispatch(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, JsonRpcError> {
        match method {
            "initialize" => Ok(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": { "name": "weather", "version": env!("CARGO_PKG_VERSION") }
            })),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => to_value(&ListToolsResult {
                tools: tool_definitions(),
            }),
            "tools/call" => {
                let name = params
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| rpc_error(error_codes::INVALID_PARAMS, "missing tool name"))?;
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| serde_json::json!({}));
                let result = self.call_tool(name, &arguments).await?;
                to_value(&result)
            }
            other => Err(rpc_error(
                error_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            )),
        }
    }

    /// Run a tool. Unknown tools are a protocol error; everything else that
    /// goes wrong is an `isError` result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<CallToolResult, JsonRpcError> {
        tracing::info!(tool = name, arguments = %arguments, "tool call");

        let outcome = match name {
            TOOL_WEATHER_WARNING => self.weather_warning(arguments).await,
            TOOL_DAILY_FORECAST => self.daily_forecast(arguments).await,
            other => {
                return Err(rpc_error(
                    error_codes::INVALID_PARAMS,
                    format!("Unknown tool: {other}"),
                ))
            }
        };

        Ok(match outcome {
            Ok(text) => CallToolResult::text(text),
            Err(e) => {
                tracing::error!(tool = name, error = %e, "tool failed");
                CallToolResult::error(e.to_string())
            }
        })
    }

    async fn weather_warning(&self, arguments: &serde_json::Value) -> Result<String, WeatherError> {
        let raw = required_location(arguments)?;
        let resolved = location::resolve(self.source.as_ref(), &raw).await?;

        let warnings = self.source.warnings(&resolved).await?;
        tracing::info!(location = %resolved, count = warnings.len(), "warnings fetched");
        Ok(format_warnings(&raw, &warnings))
    }

    async fn daily_forecast(&self, arguments: &serde_json::Value) -> Result<String, WeatherError> {
        let raw = required_location(arguments)?;
        let days = normalize_days(days_arg(arguments));
        let resolved = location::resolve(self.source.as_ref(), &raw).await?;

        let forecast = self.source.daily_forecast(&resolved, days).await?;
        tracing::info!(location = %resolved, days, count = forecast.len(), "forecast fetched");
        if forecast.is_empty() {
            return Err(WeatherError::NoData { location: raw });
        }
        Ok(format_forecast(&forecast))
    }
}

fn required_location(arguments: &serde_json::Value) -> Result<String, WeatherError> {
    location_arg(arguments).ok_or_else(|| WeatherError::Unresolved {
        location: "missing required argument 'location'".into(),
    })
}

fn to_value<T: Serialize>(value: &T) -> Result<serde_json::Value, JsonRpcError> {
    serde_json::to_value(value)
        .map_err(|e| rpc_error(error_codes::INTERNAL_ERROR, format!("serialization failed: {e}")))
}

fn encode(reply: JsonRpcReply) -> Option<String> {
    match serde_json::to_string(&reply) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize reply");
            None
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weather::provider::SimulatedWeather;
    use chrono::NaiveDate;
    use serde_json::{json, Value};

    fn server() -> WeatherServer {
        let start = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
        WeatherServer::new(Box::new(SimulatedWeather::starting(start)))
    }

    async fn roundtrip(server: &WeatherServer, msg: Value) -> Value {
        let reply = server.handle_message(&msg.to_string()).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_initialize() {
        let reply = roundtrip(
            &server(),
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        )
        .await;
        assert_eq!(reply["id"], 1);
        assert_eq!(reply["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(reply["result"]["serverInfo"]["name"], "weather");
    }

    #[tokio::test]
    async fn test_notification_gets_no_reply() {
        let reply = server()
            .handle_message(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .await;
        assert!(reply.is_none());
    }

    #[tokio::test]
    async fn test_tools_list() {
        let reply = roundtrip(
            &server(),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        )
        .await;
        let tools = reply["result"]["tools"].as_array().unwrap();
        let names: Vec<_> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["get_weather_warning", "get_daily_forecast"]);
        assert_eq!(tools[1]["inputSchema"]["required"][0], "location");
    }

    #[tokio::test]
    async fn test_forecast_call_by_city_name() {
        let reply = roundtrip(
            &server(),
            json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "get_daily_forecast", "arguments": {"location": "北京", "days": 7}}
            }),
        )
        .await;
        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        assert_eq!(text.matches("\n---\n").count(), 6);
        assert!(text.starts_with("Date: 2026-10-17"));
        assert_eq!(reply["result"]["isError"], false);
    }

    #[tokio::test]
    async fn test_integer_location_and_bad_days() {
        let reply = roundtrip(
            &server(),
            json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "get_daily_forecast", "arguments": {"location": 101010100, "days": 5}}
            }),
        )
        .await;
        let text = reply["result"]["content"][0]["text"].as_str().unwrap();
        // 5 is unsupported and falls back to 3 days.
        assert_eq!(text.matches("Date: ").count(), 3);
    }

    #[tokio::test]
    async fn test_warning_with_no_active_warnings() {
        let reply = roundtrip(
            &server(),
            json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {"name": "get_weather_warning", "arguments": {"location": "101010100"}}
            }),
        )
        .await;
        assert_eq!(
            reply["result"]["content"][0]["text"],
            "No active weather warnings for 101010100."
        );
    }

    #[tokio::test]
    async fn test_unresolvable_location_is_tool_error() {
        let reply = roundtrip(
            &server(),
            json!({
                "jsonrpc": "2.0", "id": 6, "method": "tools/call",
                "params": {"name": "get_weather_warning", "arguments": {"location": "Atlantis"}}
            }),
        )
        .await;
        assert_eq!(reply["result"]["isError"], true);
        assert!(reply["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Atlantis"));
    }

    #[tokio::test]
    async fn test_unknown_tool_and_method() {
        let s = server();
        let reply = roundtrip(
            &s,
            json!({"jsonrpc": "2.0", "id": 7, "method": "tools/call", "params": {"name": "nope"}}),
        )
        .await;
        assert_eq!(reply["error"]["code"], error_codes::INVALID_PARAMS);

        let reply = roundtrip(&s, json!({"jsonrpc": "2.0", "id": 8, "method": "resources/list"})).await;
        assert_eq!(reply["error"]["code"], error_codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_json() {
        let reply: Value =
            serde_json::from_str(&server().handle_message("{not json").await.unwrap()).unwrap();
        assert_eq!(reply["error"]["code"], error_codes::PARSE_ERROR);
        assert!(reply["id"].is_null());
    }

    #[test]
    fn test_normalize_days() {
        assert_eq!(normalize_days(None), 3);
        assert_eq!(normalize_days(Some(15)), 15);
        assert_eq!(normalize_days(Some(4)), 3);
        assert_eq!(normalize_days(Some(-7)), 3);
    }

    #[tokio::test]
    async fn test_serve_over_duplex() {
        use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

        let (mut client_out, server_in) = duplex(8192);
        let (server_out, client_in) = duplex(8192);
        let task = tokio::spawn(async move { server().serve(server_in, server_out).await });

        client_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n\n")
            .await
            .unwrap();
        client_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n")
            .await
            .unwrap();
        client_out
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(client_in).lines();
        let first: Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second: Value =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first["id"], 1);
        assert_eq!(second["id"], 2);

        drop(client_out);
        task.await.unwrap().unwrap();
    }
}
