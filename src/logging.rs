//! Logging setup.
//!
//! stdout carries the stdio transport, so logs go to stderr or to a file,
//! never to stdout.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to a file, appending across runs.
///
/// Falls back to stderr if the file cannot be opened.
pub fn init_file_logging(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file {}: {e}", path.display());
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to `file` if given, otherwise to stderr.
pub fn init(file: Option<&Path>) {
    match file {
        Some(path) => init_file_logging(path),
        None => init_stderr_logging(),
    }
}

/// Default location for `--log-file` style logging.
///
/// Uses the XDG state directory on Linux (`~/.local/state/aws-athena-mcp/`),
/// falling back to the config directory, then the temp directory.
pub fn default_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("aws-athena-mcp").join("server.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("aws-athena-mcp").join("server.log");
    }

    std::env::temp_dir().join("aws-athena-mcp.log")
}
