//! Logging for weext.
//!
//! Two layers: the [`Logger`] trait carries the user-facing progress lines of
//! an install or uninstall, filtered by an integer verbosity, while
//! `tracing` receives every message for diagnostics. [`init`] wires the
//! `tracing` subscriber to stderr or to a timestamped file.

use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Default `tracing` level.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Default console verbosity.
pub const DEFAULT_VERBOSITY: u8 = 1;

/// Sink for progress messages.
///
/// Level 0 is always shown; higher levels are increasingly detailed.
pub trait Logger {
    /// Records a message at the given verbosity level.
    fn log(&self, message: &str, level: u8);
}

/// Prints messages up to a verbosity threshold on stdout.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleLogger {
    verbosity: u8,
}

impl ConsoleLogger {
    /// Creates a console logger showing levels up to `verbosity`.
    #[must_use]
    pub fn new(verbosity: u8) -> Self {
        Self { verbosity }
    }
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self::new(DEFAULT_VERBOSITY)
    }
}

impl Logger for ConsoleLogger {
    fn log(&self, message: &str, level: u8) {
        trace_message(message, level);
        if level <= self.verbosity {
            println!("{}", message);
        }
    }
}

/// Forwards a progress message to `tracing`.
pub fn trace_message(message: &str, level: u8) {
    match level {
        0 => tracing::info!("{}", message),
        1 | 2 => tracing::debug!("{}", message),
        _ => tracing::trace!("{}", message),
    }
}

/// Diagnostic logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// `tracing` level (trace, debug, info, warn, error, off).
    pub level: String,
    /// Write diagnostics to a file under [`log_directory`] instead of stderr.
    pub to_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            to_file: false,
        }
    }
}

impl LogConfig {
    /// Parses log level from string.
    #[must_use]
    pub fn parse_level(value: &str) -> String {
        match value.to_lowercase().as_str() {
            "trace" => "trace".to_string(),
            "debug" => "debug".to_string(),
            "info" => "info".to_string(),
            "warn" | "warning" => "warn".to_string(),
            "error" => "error".to_string(),
            "off" | "none" | "disabled" => "off".to_string(),
            _ => DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

/// Returns the log directory path.
#[must_use]
pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("weext")
        .join("logs")
}

/// Returns a fresh log file path for this run.
#[must_use]
pub fn current_log_path() -> PathBuf {
    let now = chrono::Local::now();
    let filename = format!("weext_{}.log", now.format("%Y-%m-%d_%H-%M-%S"));
    log_directory().join(filename)
}

/// Initializes the `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init(config: &LogConfig) -> io::Result<()> {
    if config.level == "off" {
        return Ok(());
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.to_file {
        fs::create_dir_all(log_directory())?;
        let log_path = current_log_path();
        let log_file = File::create(&log_path)?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(Mutex::new(log_file))
                    .with_ansi(false)
                    .with_target(true),
            )
            .init();

        tracing::info!("Log file: {}", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr).with_target(false))
            .init();
    }

    Ok(())
}
