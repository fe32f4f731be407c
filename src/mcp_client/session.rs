//! Server session lifecycle — spawn, handshake, and teardown of the MCP
//! server child process.
//!
//! A session moves through `connect → ready → closed`. A failed connect never
//! leaves a child process or pipe behind: the child is killed and reaped
//! before the error is returned. `close()` is idempotent and never fails;
//! teardown problems are logged and swallowed.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;

use super::discovery::ServerLaunch;
use super::errors::McpError;
use super::retry::{retry, RetryPolicy};
use super::transport::{extract_result, StdioTransport};
use super::types::{InitializeResult, ListToolsResult, McpToolDefinition, ServerInfo, PROTOCOL_VERSION};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for closing the child's stdin during shutdown.
const CLOSE_WRITER_TIMEOUT: Duration = Duration::from_millis(500);

/// How much stderr to keep when reporting a failed startup.
const MAX_STDERR_CHARS: usize = 2000;

// ─── ToolSession ─────────────────────────────────────────────────────────────

/// The operations the catalog, invoker, and facade need from a connected
/// tool server. Implemented by [`McpSession`] and by test doubles.
#[async_trait]
pub trait ToolSession: Send + Sync {
    /// Human-readable server name.
    fn name(&self) -> &str;

    /// Whether the handshake completed and the session has not been closed.
    fn is_ready(&self) -> bool;

    /// One `tools/list` round trip.
    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError>;

    /// One `tools/call` round trip. Returns the raw result payload.
    async fn call_tool(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, McpError>;

    /// Release the server. Idempotent, never fails.
    async fn close(&self);
}

// ─── SessionOptions ──────────────────────────────────────────────────────────

/// Timeouts and environment for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Deadline for the `initialize` handshake.
    pub init_timeout: Duration,
    /// Deadline for every later request (`tools/list`, `tools/call`).
    pub request_timeout: Duration,
    /// Grace period for the child to exit after its stdin closes.
    pub shutdown_timeout: Duration,
    /// Extra environment variables for the child.
    pub env: HashMap<String, String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
            env: HashMap::new(),
        }
    }
}

// ─── McpSession ──────────────────────────────────────────────────────────────

/// A connected MCP server subprocess with its JSON-RPC transport.
pub struct McpSession {
    name: String,
    target: PathBuf,
    transport: StdioTransport,
    /// Taken by `close()`; `None` afterwards.
    process: Mutex<Option<Child>>,
    pid: Option<u32>,
    ready: AtomicBool,
    server_info: Option<ServerInfo>,
    shutdown_timeout: Duration,
}

impl McpSession {
    /// Spawn the server at `target` and perform the initialization handshake.
    ///
    /// Fails with `NotFound` if `target` does not exist, `SpawnFailed` if the
    /// process cannot start, and `InitFailed` if the handshake errors or
    /// times out. In every failure case the child has been killed and reaped.
    pub async fn connect(
        name: &str,
        target: &Path,
        options: &SessionOptions,
    ) -> Result<Self, McpError> {
        if !target.exists() {
            return Err(McpError::NotFound {
                candidates: vec![target.to_path_buf()],
            });
        }

        let launch = ServerLaunch::for_target(target);
        let mut cmd = Command::new(&launch.program);
        cmd.args(&launch.args);
        if let Some(dir) = &launch.cwd {
            cmd.current_dir(dir);
        }
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(std::process::Stdio::piped());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::info!(
            server = name,
            program = %launch.program,
            args = ?launch.args,
            "spawning MCP server"
        );

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: name.to_string(),
            reason: format!("{e}"),
        })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                reap(name, &mut child).await;
                return Err(McpError::SpawnFailed {
                    name: name.to_string(),
                    reason: "failed to capture stdio pipes".into(),
                });
            }
        };
        let stderr_handle = child.stderr.take();

        let transport = StdioTransport::new(name, stdin, stdout, options.request_timeout);

        let init = match handshake(&transport, options.init_timeout).await {
            Ok(init) => init,
            Err(e) => {
                // Stop the child first so its stderr reaches EOF.
                reap(name, &mut child).await;
                let stderr_ctx = read_stderr_on_failure(stderr_handle).await;
                if !stderr_ctx.is_empty() {
                    tracing::warn!(
                        server = name,
                        stderr = %stderr_ctx,
                        "server stderr captured on failure"
                    );
                }
                return Err(McpError::InitFailed {
                    name: name.to_string(),
                    reason: format!("{e}{}", format_stderr_suffix(&stderr_ctx)),
                });
            }
        };

        if let Some(stderr) = stderr_handle {
            forward_stderr(name.to_string(), stderr);
        }

        let pid = child.id();
        tracing::info!(
            server = name,
            pid = ?pid,
            protocol = ?init.protocol_version,
            server_name = ?init.server_info.as_ref().and_then(|i| i.name.clone()),
            "MCP server ready"
        );

        Ok(Self {
            name: name.to_string(),
            target: target.to_path_buf(),
            transport,
            process: Mutex::new(Some(child)),
            pid,
            ready: AtomicBool::new(true),
            server_info: init.server_info,
            shutdown_timeout: options.shutdown_timeout,
        })
    }

    /// [`connect`](Self::connect) under a retry policy.
    ///
    /// Only connection-class failures (spawn, handshake, channel) are retried;
    /// `NotFound` fails immediately.
    pub async fn connect_with_retry(
        name: &str,
        target: &Path,
        options: &SessionOptions,
        policy: &RetryPolicy,
    ) -> Result<Self, McpError> {
        retry(policy, "mcp_connect", McpError::is_connection_error, |attempt| {
            tracing::info!(
                server = name,
                attempt,
                max_attempts = policy.max_attempts(),
                "connecting to MCP server"
            );
            Self::connect(name, target, options)
        })
        .await
        .map_err(|failure| failure.error)
    }

    /// Path of the server executable or script.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// OS process id of the server, if it was known at spawn time.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Server info from the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    fn ensure_ready(&self, operation: &str) -> Result<(), McpError> {
        if self.ready.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(McpError::NotInitialized {
                operation: operation.to_string(),
            })
        }
    }
}

#[async_trait]
impl ToolSession for McpSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        self.ensure_ready("tools/list")?;

        let response = self.transport.request("tools/list", None).await?;
        let result = extract_result(response)?;

        let list: ListToolsResult =
            serde_json::from_value(result).map_err(|e| McpError::UnexpectedResponse {
                method: "tools/list".into(),
                reason: e.to_string(),
            })?;
        Ok(list.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &serde_json::Value,
    ) -> Result<serde_json::Value, McpError> {
        self.ensure_ready("tools/call")?;

        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let response = self.transport.request("tools/call", Some(params)).await?;
        extract_result(response)
    }

    /// Close stdin, wait for a graceful exit, then kill.
    ///
    /// Does not take the transport's reader lock, so it can run while a
    /// request is in flight; that request then fails with a transport error.
    async fn close(&self) {
        self.ready.store(false, Ordering::Release);

        let Some(mut child) = self.process.lock().await.take() else {
            tracing::debug!(server = %self.name, "session already closed");
            return;
        };

        if tokio::time::timeout(CLOSE_WRITER_TIMEOUT, self.transport.close_writer())
            .await
            .is_err()
        {
            tracing::warn!(server = %self.name, "timed out closing server stdin");
        }

        match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(server = %self.name, %status, "MCP server exited");
            }
            Ok(Err(e)) => {
                tracing::warn!(server = %self.name, error = %e, "failed to wait for MCP server");
                reap(&self.name, &mut child).await;
            }
            Err(_) => {
                tracing::warn!(
                    server = %self.name,
                    grace_ms = self.shutdown_timeout.as_millis() as u64,
                    "MCP server did not exit, killing"
                );
                reap(&self.name, &mut child).await;
            }
        }
    }
}

// ─── Handshake ───────────────────────────────────────────────────────────────

/// `initialize` request followed by the `notifications/initialized` notice.
async fn handshake(
    transport: &StdioTransport,
    timeout: Duration,
) -> Result<InitializeResult, McpError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        },
    });

    let response = transport
        .request_with_timeout("initialize", Some(params), timeout)
        .await?;
    let result = extract_result(response)?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::UnexpectedResponse {
            method: "initialize".into(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    transport.notify("notifications/initialized", None).await?;
    Ok(init)
}

// ─── Process Helpers ─────────────────────────────────────────────────────────

/// Kill the child and wait for it, logging instead of failing.
async fn reap(name: &str, child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::warn!(server = name, error = %e, "failed to kill MCP server");
    }
}

/// Relay the server's stderr into our log at debug level.
fn forward_stderr(name: String, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::debug!(server = %name, "stderr: {line}"),
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!(server = %name, error = %e, "stderr relay stopped");
                    break;
                }
            }
        }
    });
}

/// Read any available stderr output from a failed server process.
///
/// Uses a short timeout to avoid blocking if stderr stays open. Truncates to
/// keep log messages readable.
async fn read_stderr_on_failure(stderr_handle: Option<ChildStderr>) -> String {
    use tokio::io::AsyncReadExt;

    let Some(mut stderr) = stderr_handle else {
        return String::new();
    };

    let mut buf = String::new();
    match tokio::time::timeout(Duration::from_millis(500), stderr.read_to_string(&mut buf)).await
    {
        Ok(Ok(_)) => {
            if buf.len() > MAX_STDERR_CHARS {
                let mut cut = MAX_STDERR_CHARS;
                while !buf.is_char_boundary(cut) {
                    cut -= 1;
                }
                buf.truncate(cut);
                buf.push_str("...(truncated)");
            }
            buf
        }
        _ => String::new(),
    }
}

/// Format a stderr suffix for error messages (empty string if no stderr).
fn format_stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(" | stderr: {}", stderr.trim())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
