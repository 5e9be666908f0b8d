//! Logging module for the AdaptiveRefresh daemon.
//!
//! This module configures tracing with JSON format output to both stderr
//! and a rotating log file under the local data directory.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Environment variable naming an alternative log directory.
pub const LOG_DIR_ENV: &str = "ADAPTIVE_REFRESH_LOG_DIR";
/// Directory name under the platform data directory
const LOG_DIR_NAME: &str = "adaptive-refresh";
/// Maximum number of log files to retain
const MAX_LOG_FILES: usize = 3;

/// Initialize the logging system with both stderr and file output.
///
/// Logs are written in JSON format to stderr and to `daemon.<date>.log` in
/// the log directory, rotated daily with the last 3 files kept.
pub fn init_logging() -> Result<LogGuard, LoggingError> {
    let log_dir = resolve_log_directory(
        std::env::var_os(LOG_DIR_ENV).map(PathBuf::from),
        dirs::data_local_dir(),
    );

    std::fs::create_dir_all(&log_dir).map_err(|e| LoggingError::DirectoryCreationFailed {
        path: log_dir.display().to_string(),
        source: e,
    })?;

    let (file_layer_writer, file_guard) = file_writer(&log_dir)?;
    let (non_blocking_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(file_layer_writer);

    let stderr_layer = fmt::layer()
        .json()
        .with_timer(UtcTime::rfc_3339())
        .with_current_span(true)
        .with_writer(non_blocking_stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInitFailed(e.to_string()))?;

    Ok(LogGuard {
        _file_guard: file_guard,
        _stderr_guard: stderr_guard,
    })
}

fn file_writer(
    log_dir: &Path,
) -> Result<
    (
        tracing_appender::non_blocking::NonBlocking,
        tracing_appender::non_blocking::WorkerGuard,
    ),
    LoggingError,
> {
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix("daemon")
        .filename_suffix("log")
        .build(log_dir)
        .map_err(|e| LoggingError::AppenderCreationFailed(e.to_string()))?;

    Ok(tracing_appender::non_blocking(file_appender))
}

/// Pick the log directory: explicit override, then the platform data dir,
/// then the temp dir.
fn resolve_log_directory(override_dir: Option<PathBuf>, data_dir: Option<PathBuf>) -> PathBuf {
    override_dir.unwrap_or_else(|| {
        data_dir
            .unwrap_or_else(std::env::temp_dir)
            .join(LOG_DIR_NAME)
    })
}

/// Guard that keeps the non-blocking writers alive.
/// Must be held for the lifetime of the application.
pub struct LogGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
    _stderr_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Errors related to logging initialization.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Failed to create log directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create log file appender: {0}")]
    AppenderCreationFailed(String),

    #[error("Failed to install log subscriber: {0}")]
    SubscriberInitFailed(String),
}
