//! Logging module for the Pi5 fan controller.
//!
//! Configures tracing output on stderr (plain text for journald, or JSON)
//! and, optionally, a daily rotating JSON log file.

use std::path::{Path, PathBuf};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::UtcTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "pi5-fan-controller";
/// Maximum number of log files to retain
const MAX_LOG_FILES: usize = 3;

/// Output format for stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Logging options resolved from the settings and the command line.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Enables debug level events (per-tick snapshots, sensor detail).
    pub debug: bool,
    pub format: LogFormat,
    /// Directory for the rotating log file, if any.
    pub log_dir: Option<PathBuf>,
}

impl LogOptions {
    /// Filter directive used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }
}

/// Initialize the logging system.
///
/// `RUST_LOG` overrides the level chosen by the debug flag.
pub fn init_logging(options: &LogOptions) -> Result<LogGuard, LoggingError> {
    let (non_blocking_stderr, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_directive()));

    let (text_layer, json_layer) = match options.format {
        LogFormat::Text => (
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_writer(non_blocking_stderr),
            ),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .with_timer(UtcTime::rfc_3339())
                    .with_current_span(true)
                    .with_writer(non_blocking_stderr),
            ),
        ),
    };

    let (file_layer, file_guard) = match &options.log_dir {
        Some(dir) => {
            let appender = build_file_appender(dir)?;
            let (non_blocking_file, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_timer(UtcTime::rfc_3339())
                .with_thread_names(true)
                .with_file(true)
                .with_line_number(true)
                .with_writer(non_blocking_file);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text_layer)
        .with(json_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::SubscriberInitFailed(e.to_string()))?;

    Ok(LogGuard {
        _stderr_guard: stderr_guard,
        _file_guard: file_guard,
    })
}

/// Create the log directory and a daily rotating appender inside it.
fn build_file_appender(dir: &Path) -> Result<RollingFileAppender, LoggingError> {
    std::fs::create_dir_all(dir).map_err(|e| LoggingError::DirectoryCreationFailed {
        path: dir.display().to_string(),
        source: e,
    })?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .map_err(|e| LoggingError::AppenderCreationFailed(e.to_string()))
}

/// Guard that keeps the non-blocking writers alive.
/// Must be held for the lifetime of the application.
pub struct LogGuard {
    _stderr_guard: tracing_appender::non_blocking::WorkerGuard,
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Errors related to logging initialization.
#[derive(Debug)]
pub enum LoggingError {
    /// Failed to create log directory
    DirectoryCreationFailed {
        path: String,
        source: std::io::Error,
    },
    /// Failed to create file appender
    AppenderCreationFailed(String),
    /// A global subscriber was already installed
    SubscriberInitFailed(String),
}

impl std::fmt::Display for LoggingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoggingError::DirectoryCreationFailed { path, source } => {
                write!(f, "Failed to create log directory '{}': {}", path, source)
            }
            LoggingError::AppenderCreationFailed(msg) => {
                write!(f, "Failed to create log file appender: {}", msg)
            }
            LoggingError::SubscriberInitFailed(msg) => {
                write!(f, "Failed to install log subscriber: {}", msg)
            }
        }
    }
}

impl std::error::Error for LoggingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoggingError::DirectoryCreationFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
