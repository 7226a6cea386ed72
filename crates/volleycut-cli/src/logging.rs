//! Logging setup
//!
//! Stderr plus a daily rolling file, each with its own filter.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_subscriber::prelude::*;

static LOG_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Platform log directory, falling back to `.logs`
pub fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("volleycut").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".logs"))
}

/// Installs stderr and daily-file logging.
///
/// Stdout is left to command output. `RUST_LOG` overrides the `info` default.
pub fn init_logging(verbose: bool) {
    let log_dir = default_log_dir();
    let _ = std::fs::create_dir_all(&log_dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, "volleycut.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    let default_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let stderr_filter =
        tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into());
    let file_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_filter(stderr_filter);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(file_filter);

    let subscriber = tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer);

    let _ = tracing::subscriber::set_global_default(subscriber);
}
