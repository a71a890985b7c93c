//! Deterministic simulation framework for streaming client sessions.
//!
//! This module provides a controlled, reproducible host for a streaming
//! client: a seeded event queue, a simulated transport and link, and
//! invariant checks run after every event.

mod clock;
mod events;
mod invariants;
mod network;
mod scheduler;
mod simulation;
mod state;

// Re-export core types for public API
pub use clock::{DeterministicRng, SimClock};
pub use events::{EventPriority, EventType, SimulationEvent};
pub use invariants::{
    Invariant, InvariantViolation, PlaybackBoundedInvariant, RequestsNonIncreasingInvariant,
    TimerDisciplineInvariant,
};
pub use network::{
    CONNECTION_REFUSED, CONNECTION_RESET, LinkProfile, NetworkModel, SimulatedTransport,
    TransportAction,
};
pub use scheduler::{EventScheduler, MAX_EVENT_QUEUE_SIZE};
pub use simulation::{SimulationConfig, SimulationError, SimulationReport, StreamingSimulation};
pub use state::SimulationMetrics;
