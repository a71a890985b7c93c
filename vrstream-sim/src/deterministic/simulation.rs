//! Core simulation engine hosting one streaming client.

use std::time::Duration;

use thiserror::Error;
use vrstream_core::{
    ClientContext, ClientSnapshot, CrashOrigin, SimTime, StreamingClient, VrStreamError,
};

use super::clock::DeterministicRng;
use super::events::{EventPriority, EventType, SimulationEvent};
use super::invariants::{
    Invariant, PlaybackBoundedInvariant, RequestsNonIncreasingInvariant, TimerDisciplineInvariant,
};
use super::network::{LinkProfile, NetworkModel, SimulatedTransport};
use super::scheduler::EventScheduler;
use super::state::SimulationMetrics;

/// Maximum number of invariant violations before stopping simulation.
const MAX_INVARIANT_VIOLATIONS: usize = 10;

/// Default cap on dispatched events.
const DEFAULT_MAX_EVENTS: u64 = 1_000_000;

/// Errors that can occur during simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Event queue exceeded maximum capacity
    #[error("Event queue overflow: {count} events scheduled")]
    EventQueueOverflow {
        /// Number of events that caused overflow
        count: usize,
    },

    /// Event could not be scheduled properly
    #[error("Invalid event scheduling: {reason}")]
    InvalidEventScheduling {
        /// Reason why scheduling failed
        reason: String,
    },

    /// Run dispatched more events than allowed
    #[error("Event limit exceeded: {limit} events dispatched")]
    EventLimitExceeded {
        /// Configured event cap
        limit: u64,
    },

    /// Too many invariant violations occurred
    #[error("Too many invariant violations: {count}")]
    TooManyInvariantViolations {
        /// Number of violations that occurred
        count: usize,
    },

    /// Client rejected an event
    #[error("Client error: {0}")]
    Client(#[from] VrStreamError),
}

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Seed for every random decision of the run
    pub seed: u64,
    /// Link between client and server
    pub link: LinkProfile,
    /// Simulation time at which the run ends, if any
    pub horizon: Option<SimTime>,
    /// Upper bound on dispatched events
    pub max_events: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            link: LinkProfile::default(),
            horizon: Some(Duration::from_secs(600)),
            max_events: DEFAULT_MAX_EVENTS,
        }
    }
}

/// Result of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Seed used for reproduction
    pub seed: u64,
    /// Simulation time when the run ended
    pub final_time: SimTime,
    /// Total events dispatched
    pub event_count: u64,
    /// Client state at the end of the run
    pub snapshot: ClientSnapshot,
    /// Collected metrics
    pub metrics: SimulationMetrics,
    /// Whether the run finished without invariant violations
    pub success: bool,
}

impl SimulationReport {
    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        summary.push_str(&format!("Simulation Report (seed: {})\n", self.seed));
        summary.push_str(&format!(
            "Final time: {:.3}s\n",
            self.final_time.as_secs_f64()
        ));
        summary.push_str(&format!("Success: {}\n", self.success));
        summary.push_str(&self.metrics.summary());
        summary.push_str("\nEvent breakdown:\n");

        for (event_type, count) in &self.metrics.events_by_type {
            summary.push_str(&format!("  {event_type}: {count}\n"));
        }

        if !self.metrics.invariant_violations.is_empty() {
            summary.push_str("\nInvariant violations:\n");
            for violation in &self.metrics.invariant_violations {
                summary.push_str(&format!("  - {violation}\n"));
            }
        }

        let snapshot = &self.snapshot;
        summary.push_str(&format!(
            "\nFinal state:\n  Phase: {}\n  Playback: {} ({}/{} segments)\n  Buffer level: {}\n  Requests remaining: {}\n  Terminated: {}\n",
            snapshot.phase,
            snapshot.mode,
            snapshot.playback_pointer,
            snapshot.video_duration,
            snapshot.buffer_level,
            snapshot.requests_remaining,
            snapshot.terminated
        ));
        summary.push_str(&format!(
            "  Connects: {}\n  Failures: {}\n  Closes: {}\n  Requests sent: {}\n  Segments buffered: {}\n  Lookup misses: {}\n  Bytes received: {}\n",
            snapshot.stats.connects,
            snapshot.stats.failures,
            snapshot.stats.closes,
            snapshot.stats.requests_sent,
            snapshot.stats.segments_buffered,
            snapshot.stats.lookup_misses,
            snapshot.bytes_received
        ));

        summary
    }
}

/// Deterministic discrete-event host for a streaming client.
///
/// Owns the client together with the scheduler and transport it talks to.
/// The same seed and configuration always produce the same run.
pub struct StreamingSimulation {
    config: SimulationConfig,
    rng: DeterministicRng,
    scheduler: EventScheduler,
    transport: SimulatedTransport,
    network: NetworkModel,
    client: StreamingClient,
    invariants: Vec<Box<dyn Invariant>>,
    metrics: SimulationMetrics,
    last_snapshot: Option<ClientSnapshot>,
    started: bool,
}

impl StreamingSimulation {
    /// Creates a simulation around `client`.
    pub fn new(config: SimulationConfig, client: StreamingClient) -> Self {
        Self {
            rng: DeterministicRng::from_seed(config.seed),
            network: NetworkModel::new(config.link.clone()),
            config,
            scheduler: EventScheduler::new(),
            transport: SimulatedTransport::new(),
            client,
            invariants: Vec::new(),
            metrics: SimulationMetrics::new(),
            last_snapshot: None,
            started: false,
        }
    }

    /// Adds the standard client invariants.
    pub fn with_default_invariants(mut self) -> Self {
        self.add_invariant(Box::new(RequestsNonIncreasingInvariant));
        self.add_invariant(Box::new(PlaybackBoundedInvariant));
        self.add_invariant(Box::new(TimerDisciplineInvariant));
        self
    }

    /// Adds an invariant to check after every event.
    pub fn add_invariant(&mut self, invariant: Box<dyn Invariant>) {
        self.invariants.push(invariant);
    }

    /// Returns the seed used for this simulation.
    pub fn seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Returns current simulation time.
    pub fn now(&self) -> SimTime {
        self.scheduler.clock().now()
    }

    pub fn client(&self) -> &StreamingClient {
        &self.client
    }

    pub fn metrics(&self) -> &SimulationMetrics {
        &self.metrics
    }

    /// Schedules a lifecycle stop at `at`.
    ///
    /// # Errors
    /// - `SimulationError::EventQueueOverflow` - Event queue is full
    /// - `SimulationError::InvalidEventScheduling` - `at` is in the past
    pub fn schedule_shutdown(&mut self, at: SimTime) -> Result<(), SimulationError> {
        self.scheduler
            .push(at, EventType::Shutdown, EventPriority::Critical)?;
        Ok(())
    }

    /// Schedules a lifecycle crash at `at`.
    ///
    /// # Errors
    /// - `SimulationError::EventQueueOverflow` - Event queue is full
    /// - `SimulationError::InvalidEventScheduling` - `at` is in the past
    pub fn schedule_crash(&mut self, at: SimTime, origin: CrashOrigin) -> Result<(), SimulationError> {
        self.scheduler
            .push(at, EventType::Crash { origin }, EventPriority::Critical)?;
        Ok(())
    }

    /// Starts the client. Calling it again has no effect.
    ///
    /// # Errors
    /// - `SimulationError::Client` - Client refused to start
    pub fn start(&mut self) -> Result<(), SimulationError> {
        if self.started {
            return Ok(());
        }
        self.started = true;

        let mut ctx = ClientContext::new(&mut self.transport, &mut self.scheduler);
        self.client.start(&mut ctx)?;
        self.flush_transport()?;

        self.last_snapshot = Some(self.client.snapshot(self.now()));
        Ok(())
    }

    /// Dispatches the next event. Returns false once the queue is drained or
    /// the horizon is reached.
    ///
    /// # Errors
    /// - `SimulationError::EventLimitExceeded` - Event cap reached
    /// - `SimulationError::Client` - Client rejected the event
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn step(&mut self) -> Result<bool, SimulationError> {
        if self.metrics.events_processed >= self.config.max_events {
            return Err(SimulationError::EventLimitExceeded {
                limit: self.config.max_events,
            });
        }

        let Some(event) = self.scheduler.pop_next(self.config.horizon)? else {
            self.metrics.cancelled_timers_skipped = self.scheduler.cancelled_skipped();
            return Ok(false);
        };
        self.metrics.cancelled_timers_skipped = self.scheduler.cancelled_skipped();

        if self.dispatch(&event)? {
            self.metrics.record_event(event.event_type.as_str());
            self.check_invariants()?;
        }
        Ok(true)
    }

    /// Runs until the queue drains or the horizon is reached.
    ///
    /// # Errors
    /// - `SimulationError::EventLimitExceeded` - Event cap reached
    /// - `SimulationError::Client` - Client rejected an event
    /// - `SimulationError::TooManyInvariantViolations` - Too many invariant violations
    pub fn run(&mut self) -> Result<SimulationReport, SimulationError> {
        self.start()?;
        while self.step()? {}

        tracing::info!(
            "Simulation finished at {:.3}s after {} events",
            self.now().as_secs_f64(),
            self.metrics.events_processed
        );
        Ok(self.report())
    }

    /// Builds a report of the run so far.
    pub fn report(&self) -> SimulationReport {
        SimulationReport {
            seed: self.seed(),
            final_time: self.now(),
            event_count: self.metrics.events_processed,
            snapshot: self.client.snapshot(self.now()),
            metrics: self.metrics.clone(),
            success: self.metrics.invariant_violations.is_empty(),
        }
    }

    /// Delivers one event to the client. Returns false if the event belonged
    /// to a connection that no longer exists.
    fn dispatch(&mut self, event: &SimulationEvent) -> Result<bool, SimulationError> {
        if let Some(epoch) = event.event_type.epoch() {
            if !self.transport.is_current(epoch) {
                tracing::trace!(
                    "Dropping {} for stale connection {epoch}",
                    event.event_type.as_str()
                );
                self.metrics.record_stale_event();
                return Ok(false);
            }
        }

        match &event.event_type {
            EventType::Established { .. } => self.transport.mark_connected(),
            EventType::Closed { .. } | EventType::Failure { .. } => self.transport.mark_closed(),
            EventType::DataArrived { bytes, .. } => self.metrics.bytes_delivered += bytes,
            _ => {}
        }

        let mut ctx = ClientContext::new(&mut self.transport, &mut self.scheduler);
        match &event.event_type {
            EventType::TimerFired { token } => self.client.on_timer_fired(&mut ctx, *token)?,
            EventType::Established { .. } => self.client.on_established(&mut ctx)?,
            EventType::DataArrived { bytes, .. } => self.client.on_data_arrived(&mut ctx, *bytes)?,
            EventType::Closed { .. } => self.client.on_closed(&mut ctx)?,
            EventType::Failure { code, .. } => self.client.on_failure(&mut ctx, *code)?,
            EventType::Shutdown => self.client.on_shutdown(&mut ctx),
            EventType::Crash { origin } => {
                self.client.on_abort(&mut ctx, *origin);
                if *origin == CrashOrigin::ContainingUnit {
                    // The crashed unit takes its connection down with it
                    self.transport.mark_closed();
                }
            }
        }

        self.flush_transport()?;
        Ok(true)
    }

    /// Turns the client's transport actions into future transport events.
    fn flush_transport(&mut self) -> Result<(), SimulationError> {
        let now = self.scheduler.clock().now();
        for (epoch, action) in self.transport.drain_outbox() {
            for (at, event_type) in self.network.plan(&action, now, epoch, &mut self.rng) {
                self.scheduler.push(at, event_type, EventPriority::High)?;
            }
        }
        Ok(())
    }

    /// Checks all invariants.
    fn check_invariants(&mut self) -> Result<(), SimulationError> {
        let current = self.client.snapshot(self.now());

        for invariant in &self.invariants {
            if let Err(violation) = invariant.check(self.last_snapshot.as_ref(), &current) {
                tracing::warn!("{violation}");
                self.metrics.record_invariant_violation(violation);

                if self.metrics.invariant_violations.len() >= MAX_INVARIANT_VIOLATIONS {
                    return Err(SimulationError::TooManyInvariantViolations {
                        count: self.metrics.invariant_violations.len(),
                    });
                }
            }
        }

        self.last_snapshot = Some(current);
        Ok(())
    }
}
