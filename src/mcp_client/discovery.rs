//! Server target resolution — find the tool-serving subprocess on disk and
//! derive the command that launches it.
//!
//! The client checks an ordered list of candidate paths and picks the first
//! that exists. How a target is launched depends on its extension: scripts
//! go through their interpreter, anything else is executed directly.

use std::path::{Path, PathBuf};

use super::errors::McpError;

/// File name of the bundled tool server binary.
pub const SERVER_BINARY_NAME: &str = "weather-server";

// ─── Launch Detection ────────────────────────────────────────────────────────

/// How a server target is started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerKind {
    /// Python script, run with the platform Python.
    Python,
    /// JavaScript file, run with Node.
    Node,
    /// Native executable (or anything with a shebang).
    Executable,
}

/// Detect how a target should be launched from its extension.
pub fn detect_kind(target: &Path) -> ServerKind {
    match target.extension().and_then(|e| e.to_str()) {
        Some("py") => ServerKind::Python,
        Some("js") | Some("mjs") => ServerKind::Node,
        _ => ServerKind::Executable,
    }
}

/// Platform-correct Python command.
///
/// macOS 12.3+ removed the `python` symlink; only `python3` exists.
/// Windows installs Python as `python.exe` via the official installer.
fn default_python_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "python"
    } else {
        "python3"
    }
}

/// A resolved command line for a server target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLaunch {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory for the child: the target's parent directory.
    pub cwd: Option<PathBuf>,
}

impl ServerLaunch {
    /// Build the launch command for a target path.
    ///
    /// Relative targets are anchored to the current directory first: the
    /// child starts inside the target's parent, where the relative path no
    /// longer points at it.
    pub fn for_target(target: &Path) -> Self {
        let target = if target.is_absolute() {
            target.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|dir| dir.join(target))
                .unwrap_or_else(|_| target.to_path_buf())
        };
        let path = target.display().to_string();
        let (program, args) = match detect_kind(&target) {
            ServerKind::Python => (default_python_command().to_string(), vec![path]),
            ServerKind::Node => ("node".to_string(), vec![path]),
            ServerKind::Executable => (path, Vec::new()),
        };

        Self {
            program,
            args,
            cwd: target
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf),
        }
    }
}

// ─── Candidate Resolution ────────────────────────────────────────────────────

/// Default candidate locations, in priority order.
///
/// 1. Next to the running executable (the usual `cargo build` layout, where
///    both binaries land in the same `target/` directory)
/// 2. `<base>/server/weather-server`
/// 3. `<base>/bin/weather-server`
/// 4. `<base>/tools/weather_server.py` (a script-based server)
pub fn default_candidates(base_dir: &Path) -> Vec<PathBuf> {
    let binary = format!("{SERVER_BINARY_NAME}{}", std::env::consts::EXE_SUFFIX);
    let mut candidates = Vec::new();

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join(&binary));
    }

    candidates.push(base_dir.join("server").join(&binary));
    candidates.push(base_dir.join("bin").join(&binary));
    candidates.push(base_dir.join("tools").join("weather_server.py"));
    candidates
}

/// Return the first candidate that exists on disk.
///
/// Fails with `McpError::NotFound` listing every checked path.
pub fn resolve_server_target(candidates: &[PathBuf]) -> Result<PathBuf, McpError> {
    for candidate in candidates {
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "resolved MCP server target");
            return Ok(candidate.clone());
        }
    }

    Err(McpError::NotFound {
        candidates: candidates.to_vec(),
    })
}

// ─── Tests ──────────────────────────────────────────────────────────────────
