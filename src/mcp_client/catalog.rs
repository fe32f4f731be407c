//! Tool catalog — the tools a connected session exposes.
//!
//! Provides:
//! - Discovery over one `tools/list` round trip
//! - Lookup by tool name
//! - Validation that a tool call matches the discovered schema
//! - Translation into the model's function-calling declaration shape

use std::collections::HashSet;

use crate::inference::types::{FunctionDefinition, ToolDefinition};

use super::errors::McpError;
use super::session::ToolSession;
use super::types::McpToolDefinition;

// ─── ToolDescriptor ──────────────────────────────────────────────────────────

/// One discovered tool. Immutable once fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON-schema-like parameter document, kept opaque.
    pub parameters: serde_json::Value,
}

impl From<McpToolDefinition> for ToolDescriptor {
    fn from(def: McpToolDefinition) -> Self {
        let parameters = if def.input_schema.is_null() {
            serde_json::json!({"type": "object", "properties": {}})
        } else {
            def.input_schema
        };

        Self {
            name: def.name,
            description: def.description.unwrap_or_default(),
            parameters,
        }
    }
}

impl ToolDescriptor {
    /// Function-calling declaration for the model. Pure structural mapping.
    pub fn to_model_format(&self) -> ToolDefinition {
        ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: self.name.clone(),
                description: self.description.clone(),
                parameters: self.parameters.clone(),
            },
        }
    }

    /// Names listed under the schema's `required` array.
    pub fn required_fields(&self) -> Vec<&str> {
        self.parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

// ─── ToolCatalog ─────────────────────────────────────────────────────────────

/// Tools discovered on one session, in the order the server listed them.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Fetch the tool list from a ready session.
    ///
    /// Every call re-fetches. Duplicate names keep their first occurrence.
    pub async fn discover(session: &dyn ToolSession) -> Result<Self, McpError> {
        if !session.is_ready() {
            return Err(McpError::NotInitialized {
                operation: "tool discovery".into(),
            });
        }

        let raw = session.list_tools().await?;
        let catalog = Self::from_descriptors(raw.into_iter().map(ToolDescriptor::from));

        tracing::info!(
            server = session.name(),
            tool_count = catalog.len(),
            tools = ?catalog.names(),
            "discovered tools"
        );
        Ok(catalog)
    }

    /// Build a catalog from already-known descriptors.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        let mut seen = HashSet::new();
        let mut tools = Vec::new();
        for descriptor in descriptors {
            if !seen.insert(descriptor.name.clone()) {
                tracing::warn!(tool = %descriptor.name, "duplicate tool name, keeping first");
                continue;
            }
            tools.push(descriptor);
        }
        Self { tools }
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    /// Every tool as a function-calling declaration, in catalog order.
    pub fn to_model_format(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDescriptor::to_model_format).collect()
    }

    /// Validate a tool call: tool exists and required arguments are present.
    ///
    /// This is a basic structural check. Full JSON Schema validation is left
    /// to the server.
    pub fn validate_call(
        &self,
        tool_name: &str,
        arguments: &serde_json::Value,
    ) -> Result<(), McpError> {
        let descriptor = self.get(tool_name).ok_or_else(|| McpError::UnknownTool {
            name: tool_name.to_string(),
        })?;

        let args = arguments.as_object();
        for field in descriptor.required_fields() {
            let present = args.map(|obj| obj.contains_key(field)).unwrap_or(false);
            if !present {
                return Err(McpError::InvalidArguments {
                    tool: tool_name.to_string(),
                    reason: format!("missing required field: '{field}'"),
                });
            }
        }
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct ListingSession {
        ready: AtomicBool,
        list_calls: AtomicU32,
        tools: Vec<McpToolDefinition>,
    }

    impl ListingSession {
        fn new(tools: Vec<McpToolDefinition>) -> Self {
            Self {
                ready: AtomicBool::new(true),
                list_calls: AtomicU32::new(0),
                tools,
            }
        }
    }

    #[async_trait]
    impl ToolSession for ListingSession {
        fn name(&self) -> &str {
            "listing"
        }

        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tools.clone())
        }

        async fn call_tool(
            &self,
            _name: &str,
            _arguments: &serde_json::Value,
        ) -> Result<serde_json::Value, McpError> {
            unreachable!("catalog never calls tools")
        }

        async fn close(&self) {
            self.ready.store(false, Ordering::SeqCst);
        }
    }

    fn forecast_def() -> McpToolDefinition {
        McpToolDefinition {
            name: "get_daily_forecast".into(),
            description: Some("Daily forecast for a location".into()),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "location": {"type": "string"},
                    "days": {"type": "integer"}
                },
                "required": ["location"]
            }),
        }
    }

    fn warning_def() -> McpToolDefinition {
        McpToolDefinition {
            name: "get_weather_warning".into(),
            description: None,
            input_schema: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_discover_maps_entries_in_order() {
        let session = ListingSession::new(vec![warning_def(), forecast_def()]);
        let catalog = ToolCatalog::discover(&session).await.unwrap();

        assert_eq!(catalog.names(), vec!["get_weather_warning", "get_daily_forecast"]);
        let warning = catalog.get("get_weather_warning").unwrap();
        assert_eq!(warning.description, "");
        assert_eq!(warning.parameters["type"], "object");
        assert_eq!(session.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_discover_refetches_each_call() {
        let session = ListingSession::new(vec![forecast_def()]);
        ToolCatalog::discover(&session).await.unwrap();
        ToolCatalog::discover(&session).await.unwrap();
        assert_eq!(session.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_discover_requires_ready_session() {
        let session = ListingSession::new(vec![forecast_def()]);
        session.close().await;

        let err = ToolCatalog::discover(&session).await.unwrap_err();
        assert!(matches!(err, McpError::NotInitialized { .. }));
        assert_eq!(session.list_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_model_format_shape() {
        let descriptor = ToolDescriptor::from(forecast_def());
        let value = serde_json::to_value(descriptor.to_model_format()).unwrap();
        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "get_daily_forecast");
        assert_eq!(value["function"]["description"], "Daily forecast for a location");
        assert_eq!(value["function"]["parameters"]["required"][0], "location");
    }

    #[test]
    fn test_duplicate_names_keep_first() {
        let mut second = forecast_def();
        second.description = Some("shadow".into());
        let catalog = ToolCatalog::from_descriptors(
            [forecast_def(), second].into_iter().map(ToolDescriptor::from),
        );
        assert_eq!(catalog.len(), 1);
        assert_eq!(
            catalog.get("get_daily_forecast").unwrap().description,
            "Daily forecast for a location"
        );
    }

    #[test]
    fn test_validate_call() {
        let catalog = ToolCatalog::from_descriptors([ToolDescriptor::from(forecast_def())]);

        assert!(catalog
            .validate_call("get_daily_forecast", &serde_json::json!({"location": "101010100"}))
            .is_ok());
        assert!(matches!(
            catalog.validate_call("get_daily_forecast", &serde_json::json!({"days": 3})),
            Err(McpError::InvalidArguments { .. })
        ));
        assert!(matches!(
            catalog.validate_call("delete_everything", &serde_json::json!({})),
            Err(McpError::UnknownTool { .. })
        ));
    }
}
