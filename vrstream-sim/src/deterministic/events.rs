//! Event types and ordering for deterministic simulations.

use std::cmp::Ordering;

use vrstream_core::{CrashOrigin, SimTime, TimerToken};

/// Priority levels for simulation events.
///
/// Lower numeric values have higher priority when events
/// occur at the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EventPriority {
    Critical = 0, // Lifecycle signals
    High = 1,     // Transport callbacks
    Normal = 2,   // Timer fires
}

/// Types of events that can occur in the simulation.
///
/// Transport events carry the connection epoch they belong to, so events of
/// a torn-down connection can be recognised and dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum EventType {
    /// A client timer fires
    TimerFired { token: TimerToken },
    /// Connection open completed
    Established { epoch: u64 },
    /// Reply bytes arrived
    DataArrived { epoch: u64, bytes: u64 },
    /// Graceful close completed
    Closed { epoch: u64 },
    /// Connection failed
    Failure { epoch: u64, code: i32 },
    /// Lifecycle stop
    Shutdown,
    /// Lifecycle crash
    Crash { origin: CrashOrigin },
}

impl EventType {
    /// Returns string representation of event type for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::TimerFired { .. } => "TimerFired",
            EventType::Established { .. } => "Established",
            EventType::DataArrived { .. } => "DataArrived",
            EventType::Closed { .. } => "Closed",
            EventType::Failure { .. } => "Failure",
            EventType::Shutdown => "Shutdown",
            EventType::Crash { .. } => "Crash",
        }
    }

    /// Connection epoch of a transport event.
    pub fn epoch(&self) -> Option<u64> {
        match self {
            EventType::Established { epoch }
            | EventType::DataArrived { epoch, .. }
            | EventType::Closed { epoch }
            | EventType::Failure { epoch, .. } => Some(*epoch),
            _ => None,
        }
    }
}

/// Simulation event with timestamp and priority.
#[derive(Debug, Clone)]
pub struct SimulationEvent {
    /// Unique event ID for deterministic ordering
    pub id: u64,
    /// Scheduled execution time
    pub timestamp: SimTime,
    /// Type of event
    pub event_type: EventType,
    /// Priority for events at same timestamp
    pub priority: EventPriority,
}

impl SimulationEvent {
    /// Creates new simulation event.
    pub fn new(id: u64, timestamp: SimTime, event_type: EventType, priority: EventPriority) -> Self {
        Self {
            id,
            timestamp,
            event_type,
            priority,
        }
    }
}

impl Eq for SimulationEvent {}

impl PartialEq for SimulationEvent {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Ord for SimulationEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed throughout so BinaryHeap pops the earliest event first
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.priority.cmp(&other.priority))
            .then_with(|| self.id.cmp(&other.id))
            .reverse()
    }
}

impl PartialOrd for SimulationEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_heap_pops_earliest_first() {
        let mut heap = BinaryHeap::new();
        heap.push(SimulationEvent::new(
            1,
            Duration::from_secs(2),
            EventType::Shutdown,
            EventPriority::Critical,
        ));
        heap.push(SimulationEvent::new(
            2,
            Duration::from_secs(1),
            EventType::Closed { epoch: 1 },
            EventPriority::Normal,
        ));

        assert_eq!(heap.pop().unwrap().id, 2);
        assert_eq!(heap.pop().unwrap().id, 1);
    }

    #[test]
    fn test_priority_breaks_timestamp_ties() {
        let mut heap = BinaryHeap::new();
        let at = Duration::from_secs(1);
        heap.push(SimulationEvent::new(
            1,
            at,
            EventType::DataArrived { epoch: 1, bytes: 10 },
            EventPriority::High,
        ));
        heap.push(SimulationEvent::new(
            2,
            at,
            EventType::Shutdown,
            EventPriority::Critical,
        ));
        heap.push(SimulationEvent::new(
            0,
            at,
            EventType::Closed { epoch: 1 },
            EventPriority::High,
        ));

        let order: Vec<u64> = std::iter::from_fn(|| heap.pop().map(|e| e.id)).collect();
        assert_eq!(order, vec![2, 0, 1]);
    }

    #[test]
    fn test_event_epochs() {
        assert_eq!(EventType::Failure { epoch: 3, code: 1 }.epoch(), Some(3));
        assert_eq!(EventType::Shutdown.epoch(), None);
        assert_eq!(EventType::Shutdown.as_str(), "Shutdown");
    }
}
