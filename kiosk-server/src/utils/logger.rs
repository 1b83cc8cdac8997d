//! Logging Infrastructure
//!
//! fmt subscriber with an optional daily rolling file and JSON output.
//! `RUST_LOG` takes precedence over the configured level.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Initialize the logger with default settings
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger with optional file output
///
/// Repeated calls are ignored, which keeps tests that share a process quiet.
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file_dir = log_dir.filter(|dir| Path::new(dir).is_dir());
    let result = match (file_dir, json.unwrap_or(false)) {
        (Some(dir), true) => builder
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, "kiosk-server"))
            .try_init(),
        (Some(dir), false) => builder
            .with_ansi(false)
            .with_writer(tracing_appender::rolling::daily(dir, "kiosk-server"))
            .try_init(),
        (None, true) => builder.json().try_init(),
        (None, false) => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logger already initialized");
    }
}
