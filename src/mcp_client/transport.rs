//! JSON-RPC over stdio transport.
//!
//! Handles low-level communication with the MCP server child process:
//! - Writing JSON-RPC requests to the child's stdin
//! - Reading JSON-RPC responses from the child's stdout
//! - Line-delimited JSON protocol (one JSON object per line)
//!
//! The transport is generic over its byte streams so that tests can drive it
//! with in-memory pipes.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::types::{JsonRpcRequest, JsonRpcResponse};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

// ─── Transport ───────────────────────────────────────────────────────────────

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    next_id: AtomicU64,
    /// `None` once the write side has been closed.
    writer: Mutex<Option<BoxedWriter>>,
    reader: Mutex<BufReader<BoxedReader>>,
    request_timeout: Duration,
}

impl StdioTransport {
    /// Create a new transport from a writable and a readable stream.
    pub fn new<W, R>(server_name: &str, writer: W, reader: R, request_timeout: Duration) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            server_name: server_name.to_string(),
            next_id: AtomicU64::new(1),
            writer: Mutex::new(Some(Box::new(writer))),
            reader: Mutex::new(BufReader::new(Box::new(reader))),
            request_timeout,
        }
    }

    /// The server name used in error messages.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Send a JSON-RPC request and wait for the matching response.
    ///
    /// The whole round trip is bounded by the transport's request timeout.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        self.request_with_timeout(method, params, self.request_timeout)
            .await
    }

    /// Like [`request`](Self::request) with an explicit deadline.
    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, McpError> {
        tokio::time::timeout(timeout, self.round_trip(method, params))
            .await
            .map_err(|_| McpError::Timeout {
                method: method.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })?
    }

    /// Write one request line, then read lines until the matching `id` shows up.
    async fn round_trip(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);

        let json = serde_json::to_string(&req).map_err(|e| self.error(format!(
            "failed to serialize request: {e}"
        )))?;
        self.write_line(json).await?;

        let mut line_buf = String::new();
        let mut reader = self.reader.lock().await;

        loop {
            line_buf.clear();
            let bytes_read = reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| self.error(format!("failed to read from stdout: {e}")))?;

            if bytes_read == 0 {
                return Err(self.error(
                    "server stdout closed (process may have exited)".to_string(),
                ));
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == Some(id) => return Ok(resp),
                Ok(resp) => {
                    tracing::debug!(
                        server = %self.server_name,
                        expected = id,
                        got = ?resp.id,
                        "skipping response for another request"
                    );
                }
                Err(_) => {
                    // Server log output or a server-initiated message.
                    tracing::trace!(server = %self.server_name, line = trimmed, "skipping non-response line");
                }
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let mut notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
        });
        if let Some(params) = params {
            notification["params"] = params;
        }

        let json = serde_json::to_string(&notification)
            .map_err(|e| self.error(format!("failed to serialize notification: {e}")))?;
        self.write_line(json).await
    }

    /// Close the write side. The server sees EOF on its stdin.
    ///
    /// Idempotent: closing an already-closed writer is a no-op.
    pub async fn close_writer(&self) {
        let mut writer = self.writer.lock().await;
        if let Some(mut w) = writer.take() {
            if let Err(e) = w.shutdown().await {
                tracing::debug!(server = %self.server_name, error = %e, "stdin shutdown failed");
            }
        }
    }

    async fn write_line(&self, mut json: String) -> Result<(), McpError> {
        json.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| self.error("transport closed".to_string()))?;

        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.error(format!("failed to flush stdin: {e}")))?;
        Ok(())
    }

    fn error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
