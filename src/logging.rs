//! Logging initialization.
//!
//! The crate logs through `tracing` with structured fields. Hosts that embed
//! the client may install their own subscriber instead; this helper covers
//! the common case of stdout logging with an optional rolling daily file.
//!
//! ```bash
//! # Debug only the session module
//! RUST_LOG=intrinio_realtime::client=debug
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Directory for the optional rolling log file.
    pub log_dir: Option<PathBuf>,
    /// File name prefix inside `log_dir`.
    pub file_prefix: String,
}

/// Install a global subscriber: stdout plus an optional daily-rolling file.
/// Level filtering follows `RUST_LOG`, defaulting to `info`.
///
/// Returns the appender guard when file logging is enabled; dropping it
/// flushes and stops the background writer.
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(true);

    match &config.log_dir {
        Some(dir) => {
            let prefix = if config.file_prefix.is_empty() {
                "intrinio-realtime"
            } else {
                config.file_prefix.as_str()
            };
            let appender = RollingFileAppender::new(Rotation::DAILY, dir, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .boxed();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer)
                .init();
            None
        }
    }
}
