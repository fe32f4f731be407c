//! WeatherAgent — the client facade.
//!
//! Composes the tool session, catalog, invoker, and conversation loop behind
//! three calls:
//!
//! - [`initialize`](WeatherAgent::initialize): locate and spawn the weather
//!   server, handshake, discover tools once.
//! - [`ask`](WeatherAgent::ask): run one conversation to completion.
//! - [`cleanup`](WeatherAgent::cleanup): shut the server down. Idempotent.
//!
//! [`WeatherAgent::ask_once`] bundles all three for a single query and
//! always cleans up.
//!
//! `cleanup` may run while an `ask` is in flight. It never waits for the
//! conversation: the connection is taken out under a short lock and closed,
//! and the in-flight tool call fails with a transport error that the loop
//! folds into history like any other tool failure.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::AppConfig;
use crate::inference::client::{ChatModel, InferenceClient};
use crate::inference::types::ToolDefinition;
use crate::mcp_client::catalog::ToolCatalog;
use crate::mcp_client::discovery::resolve_server_target;
use crate::mcp_client::invoker::ToolInvoker;
use crate::mcp_client::session::{McpSession, ToolSession};

use super::agent_loop::{ConversationLoop, ConversationOutcome};
use super::errors::AgentError;
use super::prompts::build_system_prompt;
use super::tool_router::ToolRouter;

const SERVER_NAME: &str = "weather";

/// A live session plus everything derived from it. Replaced as a unit.
struct Connection {
    session: Arc<dyn ToolSession>,
    catalog: ToolCatalog,
    tools: Vec<ToolDefinition>,
    system_prompt: String,
}

/// Weather assistant client.
pub struct WeatherAgent {
    config: AppConfig,
    model: Arc<dyn ChatModel>,
    router: ToolRouter,
    connection: Mutex<Option<Arc<Connection>>>,
    /// Serializes `ask` calls on one agent.
    ask_gate: Mutex<()>,
}

impl WeatherAgent {
    pub fn new(config: AppConfig, model: Arc<dyn ChatModel>) -> Self {
        let router = ToolRouter::new(
            ToolInvoker::new(config.agent.tool_retry.policy()),
            config.agent.max_tool_result_chars,
        );
        Self {
            config,
            model,
            router,
            connection: Mutex::new(None),
            ask_gate: Mutex::new(()),
        }
    }

    /// Build an agent backed by the configured OpenAI-compatible endpoint.
    ///
    /// Fails with a configuration error when no API key is set.
    pub fn from_config(config: AppConfig) -> Result<Self, AgentError> {
        config.model.validate()?;
        let model = InferenceClient::from_config(&config.model)?;
        Ok(Self::new(config, Arc::new(model)))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Spawn the weather server and discover its tools.
    ///
    /// A no-op when already initialized. Connection failures are retried
    /// per `server.connect_retry`; a missing server fails at once.
    pub async fn initialize(&self) -> Result<(), AgentError> {
        if self.is_initialized().await {
            tracing::debug!("agent already initialized");
            return Ok(());
        }

        let target = resolve_server_target(&self.config.server.candidates())?;
        let session = McpSession::connect_with_retry(
            SERVER_NAME,
            &target,
            &self.config.server.session_options(&self.config.weather),
            &self.config.server.connect_retry.policy(),
        )
        .await?;
        self.initialize_with(Arc::new(session)).await
    }

    /// Adopt an already-connected session and discover its tools.
    ///
    /// The session is closed if discovery fails. Any previous connection is
    /// closed and replaced.
    pub async fn initialize_with(&self, session: Arc<dyn ToolSession>) -> Result<(), AgentError> {
        let catalog = match ToolCatalog::discover(session.as_ref()).await {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!(server = session.name(), error = %e, "tool discovery failed");
                session.close().await;
                return Err(e.into());
            }
        };

        let connection = Arc::new(Connection {
            system_prompt: build_system_prompt(&catalog),
            tools: catalog.to_model_format(),
            catalog,
            session,
        });

        tracing::info!(
            server = connection.session.name(),
            tools = ?connection.catalog.names(),
            "agent initialized"
        );

        let previous = self.connection.lock().await.replace(connection);
        if let Some(old) = previous {
            old.session.close().await;
        }
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Tools discovered at initialization.
    pub async fn catalog(&self) -> Option<ToolCatalog> {
        self.connection
            .lock()
            .await
            .as_ref()
            .map(|c| c.catalog.clone())
    }

    /// Answer `query`. Returns the model's answer or a diagnostic message.
    pub async fn ask(&self, query: &str) -> Result<String, AgentError> {
        Ok(self.ask_detailed(query).await?.answer)
    }

    /// Like [`ask`](Self::ask), with the full history and loop status.
    pub async fn ask_detailed(&self, query: &str) -> Result<ConversationOutcome, AgentError> {
        let _gate = self.ask_gate.lock().await;

        let connection = self
            .connection
            .lock()
            .await
            .clone()
            .ok_or_else(|| AgentError::NotInitialized {
                operation: "ask".to_string(),
            })?;

        tracing::info!(query_chars = query.chars().count(), "processing query");

        let outcome = ConversationLoop::new(
            &connection.system_prompt,
            query,
            self.config.agent.max_tool_rounds,
        )
        .run(
            self.model.as_ref(),
            &connection.tools,
            &self.router,
            connection.session.as_ref(),
            &connection.catalog,
        )
        .await;
        Ok(outcome)
    }

    /// Close the server session. Safe to call repeatedly, before
    /// `initialize`, or while an `ask` is running.
    pub async fn cleanup(&self) {
        let connection = self.connection.lock().await.take();
        match connection {
            Some(connection) => {
                connection.session.close().await;
                tracing::info!(server = connection.session.name(), "agent cleaned up");
            }
            None => tracing::debug!("cleanup: nothing to close"),
        }
    }

    /// `initialize → ask → cleanup` on this agent. Cleanup runs on every path.
    pub async fn run_once(&self, query: &str) -> Result<String, AgentError> {
        let result = match self.initialize().await {
            Ok(()) => self.ask(query).await,
            Err(e) => Err(e),
        };
        self.cleanup().await;
        result
    }

    /// One-shot query with a fresh agent built from `config`.
    pub async fn ask_once(config: AppConfig, query: &str) -> Result<String, AgentError> {
        Self::from_config(config)?.run_once(query).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
