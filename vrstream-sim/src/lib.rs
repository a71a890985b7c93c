//! VRStream Simulation - Deterministic host for streaming client sessions.
//!
//! This crate stands in for the discrete-event scheduler and the byte-stream
//! transport a `StreamingClient` is written against, so whole sessions can
//! be run, inspected and replayed without a network.
//!
//! # Features
//!
//! - **Deterministic Execution**: Same seed always produces identical results
//! - **Event-Based Simulation**: Timer fires and transport events on one queue
//! - **Link Simulation**: Configurable latency, bandwidth and failures
//! - **Invariant Checking**: Validate client state after every event
//!
//! # Example
//!
//! ```rust,no_run
//! use vrstream_core::ClientConfig;
//! use vrstream_sim::Scenario;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig {
//!     trace_path: None,
//!     ..Default::default()
//! };
//!
//! let mut sim = Scenario::Steady.build(config, 12345)?;
//! let report = sim.run()?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]

pub mod deterministic;
pub mod scenarios;

pub use deterministic::{
    DeterministicRng, EventPriority, EventScheduler, EventType, Invariant, InvariantViolation,
    LinkProfile, NetworkModel, PlaybackBoundedInvariant, RequestsNonIncreasingInvariant, SimClock,
    SimulatedTransport, SimulationConfig, SimulationError, SimulationEvent, SimulationMetrics,
    SimulationReport, StreamingSimulation, TimerDisciplineInvariant, TransportAction,
};
pub use scenarios::Scenario;
