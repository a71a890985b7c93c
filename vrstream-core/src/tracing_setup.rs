//! Tracing setup for VRStream
//!
//! Console logs follow the user's chosen level. When a run directory is
//! given, a full debug log of the run is written next to its metric files.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File name of the run log inside the run directory.
pub const RUN_LOG_FILE: &str = "vrstream-run.log";

/// Initialize tracing with console output at `console_level`, plus a debug
/// log at `run_dir/vrstream-run.log` when `run_dir` is set.
///
/// `RUST_LOG` overrides the console level when set. The run log is
/// overwritten on every run. Returns the path of the run log, if any.
///
/// # Errors
///
/// - `std::io::Error` - Run directory cannot be created or log file cannot be opened
pub fn init_tracing(
    console_level: Level,
    run_dir: Option<&Path>,
) -> Result<Option<PathBuf>, std::io::Error> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let (file_layer, log_path) = match run_dir {
        Some(dir) => {
            create_dir_all(dir)?;
            let path = dir.join(RUN_LOG_FILE);
            let file = File::create(&path)?;
            let layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(file)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    match &log_path {
        Some(path) => tracing::debug!(
            "Tracing initialized: console={}, run_log={}",
            console_level,
            path.display()
        ),
        None => tracing::debug!("Tracing initialized: console={console_level}"),
    }

    Ok(log_path)
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warning and error messages
    Warn,
    /// Informational, warning, and error messages
    Info,
    /// Debug, informational, warning, and error messages
    Debug,
    /// All messages including detailed tracing
    Trace,
}

impl CliLogLevel {
    /// Converts CLI log level to tracing Level enum.
    ///
    /// # Examples
    /// ```
    /// use vrstream_core::tracing_setup::CliLogLevel;
    ///
    /// let level = CliLogLevel::Info.as_tracing_level();
    /// assert_eq!(level, tracing::Level::INFO);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}
