//! VRStream Core - Client-side streaming session state machine
//!
//! Models a client that requests video segments one after another over a
//! reliable byte-stream connection, fills a playback buffer from the replies,
//! ticks a playback clock and manages its connection lifecycle. Everything is
//! driven by discrete events: timer fires, transport callbacks and lifecycle
//! signals. The transport and the scheduler are external collaborators
//! reached through the [`Transport`] and [`Scheduler`] traits.

pub mod client;
pub mod config;
pub mod metrics;
pub mod playback;
pub mod request;
pub mod session;
pub mod timer;
pub mod trace;
pub mod tracing_setup;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_mocks;

// Re-export main types for convenient access
pub use client::{
    ClientContext, ClientSnapshot, ClientStats, ConnectionPhase, CrashOrigin, StreamingClient,
};
pub use config::{ClientConfig, ConfigError};
pub use metrics::{CsvMetricsSink, MemoryMetricsSink, Metric, MetricsSink, NullMetricsSink, Sample};
pub use playback::{PlaybackMode, PlaybackState, TickOutcome};
pub use request::{LookupOutcome, RequestBuilder, RequestDescriptor};
pub use session::Session;
pub use timer::{
    ArmedTimer, Scheduler, SimTime, TimerCoordinator, TimerError, TimerKind, TimerSlot, TimerToken,
};
pub use trace::{TraceEntry, TraceError, TraceTable};
pub use transport::{Transport, TransportState};

/// Errors that can surface from a streaming client.
///
/// Lookup misses and transport failures are recovered inside the client and
/// never show up here.
#[derive(Debug, thiserror::Error)]
pub enum VrStreamError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VrStreamError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            VrStreamError::Config(ConfigError::InvalidTimeBounds { start, stop }) => format!(
                "Stop time {:.3}s is earlier than start time {:.3}s",
                stop.as_secs_f64(),
                start.as_secs_f64()
            ),
            VrStreamError::Config(e) => format!("Invalid configuration: {e}"),
            VrStreamError::Trace(TraceError::Open { path, .. }) => {
                format!("Cannot open trace file: {}", path.display())
            }
            VrStreamError::Trace(_) => "Trace file could not be read".to_string(),
            VrStreamError::Timer(_) => "Internal timer error".to_string(),
            VrStreamError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            VrStreamError::Config(_) | VrStreamError::Trace(TraceError::Open { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, VrStreamError>;
