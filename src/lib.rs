pub mod agent_core;
pub mod config;
pub mod inference;
pub mod mcp_client;
pub mod weather;

use std::path::{Path, PathBuf};

use config::{LogConfig, LogFormat};

/// Return the platform-standard data directory for the weather agent.
///
/// - macOS: `~/Library/Application Support/weather-agent/`
/// - Windows: `{FOLDERID_RoamingAppData}\weather-agent\`
/// - Linux: `$XDG_DATA_HOME/weather-agent/` (fallback `~/.local/share/...`)
///
/// Falls back to `~/.weather-agent/` only if none of the above can be resolved.
pub(crate) fn data_dir() -> PathBuf {
    if let Some(dir) = dirs::data_dir() {
        return dir.join("weather-agent");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".weather-agent")
}

/// Initialize the tracing subscriber — writes structured logs to a file.
///
/// Called once at process start by each binary, with that binary's default
/// file name (`agent.log`, `weather-server.log`). On each call:
/// 1. Rotates existing logs (`x.log` → `x.log.1` → … keeping `keep_files`).
/// 2. Opens a fresh log with a line-flushing writer for crash resilience.
/// 3. Logs a startup banner with the log path for discoverability.
///
/// Logs never go to stdout: the tool server's stdout is its protocol channel.
/// Returns the log file path.
pub fn init_tracing(config: &LogConfig, default_file_name: &str) -> std::io::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_path = config.file_or(default_file_name);
    if let Some(dir) = log_path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    rotate_log_file(&log_path, config.keep_files);

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    let flushing_writer = FlushingWriter::new(log_file);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let installed = match config.format {
        LogFormat::Text => fmt::fmt()
            .with_env_filter(filter)
            .with_writer(flushing_writer)
            .with_ansi(false)
            .with_target(true)
            .try_init(),
        LogFormat::Json => fmt::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(flushing_writer)
            .with_target(true)
            .try_init(),
    };
    installed.map_err(|e| std::io::Error::other(format!("tracing already initialized: {e}")))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_path.display(),
        pid = std::process::id(),
        "=== {default_file_name} starting ==="
    );
    Ok(log_path)
}

/// Rotate log files: `x.log` → `x.log.1` → `.2` → … → `.{keep}`.
///
/// Oldest file beyond `keep` is deleted. Missing files in the chain are skipped.
/// `keep == 0` simply deletes the current file.
fn rotate_log_file(base_path: &Path, keep: u32) {
    if keep == 0 {
        let _ = std::fs::remove_file(base_path);
        return;
    }

    // Delete the oldest
    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    // Shift: .{n-1} → .{n}
    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    // Current → .1
    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

/// A writer that wraps `std::fs::File` and flushes after every write.
///
/// `tracing-subscriber` buffers log output internally. Without explicit
/// flushing, log entries may sit in OS buffers and be lost on crash.
#[derive(Clone)]
struct FlushingWriter {
    file: std::sync::Arc<std::sync::Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: std::sync::Arc::new(std::sync::Mutex::new(file)),
        }
    }
}

impl std::io::Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = std::io::Write::write(&mut *f, buf)?;
        std::io::Write::flush(&mut *f)?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        std::io::Write::flush(&mut *f)
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
