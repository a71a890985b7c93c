//! Metrics collected while a simulation runs.

use std::collections::BTreeMap;

use super::invariants::InvariantViolation;

/// Metrics collected during simulation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationMetrics {
    /// Total events dispatched to the client
    pub events_processed: u64,
    /// Events by type
    pub events_by_type: BTreeMap<String, u64>,
    /// Transport events dropped because their connection was gone
    pub stale_events_dropped: u64,
    /// Cancelled timer fires skipped by the scheduler
    pub cancelled_timers_skipped: u64,
    /// Bytes delivered to the client
    pub bytes_delivered: u64,
    /// Invariant violations detected
    pub invariant_violations: Vec<InvariantViolation>,
}

impl SimulationMetrics {
    /// Creates new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event being processed.
    pub fn record_event(&mut self, event_type_str: &str) {
        self.events_processed += 1;
        *self
            .events_by_type
            .entry(event_type_str.to_string())
            .or_insert(0) += 1;
    }

    /// Records a transport event for a connection that no longer exists.
    pub fn record_stale_event(&mut self) {
        self.stale_events_dropped += 1;
    }

    /// Records an invariant violation.
    pub fn record_invariant_violation(&mut self, violation: InvariantViolation) {
        self.invariant_violations.push(violation);
    }

    /// Generates summary statistics.
    pub fn summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str(&format!("Events processed: {}\n", self.events_processed));
        summary.push_str(&format!("Stale events dropped: {}\n", self.stale_events_dropped));
        summary.push_str(&format!(
            "Cancelled timers skipped: {}\n",
            self.cancelled_timers_skipped
        ));
        summary.push_str(&format!("Bytes delivered: {}\n", self.bytes_delivered));
        summary.push_str(&format!(
            "Invariant violations: {}\n",
            self.invariant_violations.len()
        ));

        summary
    }
}
