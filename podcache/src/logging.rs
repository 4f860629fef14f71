//! Logging setup for processes embedding the pool cache.
//!
//! The cache itself only emits `tracing` events. This module installs a
//! subscriber that writes them to a log file (cleared on start) and to
//! stdout, filtered by `RUST_LOG` (default `info`).

use crate::config::LoggingSettings;
use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard will flush and close the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging.
///
/// Creates `log_dir` if needed, truncates `log_file`, and installs a global
/// subscriber writing to both the file and stdout.
///
/// # Arguments
///
/// * `log_dir` - Directory for log files (e.g., "logs")
/// * `log_file` - Log filename (e.g., "podcache.log")
///
/// # Returns
///
/// LoggingGuard that must be kept alive for file output to be flushed
///
/// # Errors
///
/// Returns an error if the directory cannot be created, the file cannot be
/// cleared, or a global subscriber is already installed.
pub fn init_logging(log_dir: &Path, log_file: &str) -> Result<LoggingGuard, io::Error> {
    prepare_log_file(log_dir, log_file)?;

    // Non-blocking writer; the guard flushes it on drop
    let file_appender = tracing_appender::rolling::never(log_dir, log_file);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false); // No ANSI colors in file

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_ansi(true);

    // Defaults to INFO if RUST_LOG is not set
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Fails instead of panicking when a subscriber is already installed
    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| io::Error::other(e.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

/// Initialize logging from loaded settings.
pub fn init_from_settings(settings: &LoggingSettings) -> Result<LoggingGuard, io::Error> {
    init_logging(&settings.directory, &settings.file)
}

/// Creates the log directory and truncates the log file.
fn prepare_log_file(log_dir: &Path, log_file: &str) -> Result<(), io::Error> {
    fs::create_dir_all(log_dir)?;
    fs::write(log_dir.join(log_file), "")
}

/// Get default log directory path.
pub fn default_log_dir() -> &'static str {
    "logs"
}

/// Get default log file name.
pub fn default_log_file() -> &'static str {
    "podcache.log"
}
