//! Event queue and timer scheduling for deterministic simulations.

use std::collections::{BinaryHeap, HashSet};

use vrstream_core::{Scheduler, SimTime, TimerToken};

use super::clock::SimClock;
use super::events::{EventPriority, EventType, SimulationEvent};
use super::simulation::SimulationError;

/// Maximum number of events that can be scheduled.
pub const MAX_EVENT_QUEUE_SIZE: usize = 100_000;

/// Min-heap of pending events plus the clock they advance.
///
/// Timer cancellations are lazy: a cancelled token stays in the heap and is
/// skipped when it reaches the front.
#[derive(Debug, Default)]
pub struct EventScheduler {
    clock: SimClock,
    event_queue: BinaryHeap<SimulationEvent>,
    next_event_id: u64,
    cancelled: HashSet<TimerToken>,
    cancelled_skipped: u64,
    overflow: Option<usize>,
}

impl EventScheduler {
    /// Creates an empty scheduler at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the simulation clock.
    pub fn clock(&self) -> &SimClock {
        &self.clock
    }

    /// Number of queued events, cancelled timers included.
    pub fn len(&self) -> usize {
        self.event_queue.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.event_queue.is_empty()
    }

    /// Number of cancelled timer fires skipped so far.
    pub fn cancelled_skipped(&self) -> u64 {
        self.cancelled_skipped
    }

    /// Queues an event at absolute time `at`.
    ///
    /// # Errors
    ///
    /// - `SimulationError::EventQueueOverflow` - Event queue is full
    /// - `SimulationError::InvalidEventScheduling` - `at` is in the past
    pub fn push(
        &mut self,
        at: SimTime,
        event_type: EventType,
        priority: EventPriority,
    ) -> Result<u64, SimulationError> {
        if self.event_queue.len() >= MAX_EVENT_QUEUE_SIZE {
            return Err(SimulationError::EventQueueOverflow {
                count: self.event_queue.len(),
            });
        }
        if at < self.clock.now() {
            return Err(SimulationError::InvalidEventScheduling {
                reason: format!(
                    "{} at {:?} is before current time {:?}",
                    event_type.as_str(),
                    at,
                    self.clock.now()
                ),
            });
        }

        let id = self.next_event_id;
        self.next_event_id += 1;
        self.event_queue
            .push(SimulationEvent::new(id, at, event_type, priority));
        Ok(id)
    }

    /// Pops the next live event and advances the clock to it.
    ///
    /// Returns `None` when the queue is drained or the next event lies past
    /// `horizon`; in the latter case the clock is moved to the horizon.
    ///
    /// # Errors
    ///
    /// - `SimulationError::EventQueueOverflow` - A timer arming overflowed the queue
    pub fn pop_next(
        &mut self,
        horizon: Option<SimTime>,
    ) -> Result<Option<SimulationEvent>, SimulationError> {
        if let Some(count) = self.overflow.take() {
            return Err(SimulationError::EventQueueOverflow { count });
        }

        while let Some(event) = self.event_queue.pop() {
            if let EventType::TimerFired { token } = &event.event_type {
                if self.cancelled.remove(token) {
                    self.cancelled_skipped += 1;
                    continue;
                }
            }

            if let Some(limit) = horizon {
                if event.timestamp > limit {
                    self.event_queue.push(event);
                    self.clock.advance_to(limit.max(self.clock.now()))?;
                    return Ok(None);
                }
            }

            self.clock.advance_to(event.timestamp)?;
            return Ok(Some(event));
        }

        Ok(None)
    }
}

impl Scheduler for EventScheduler {
    fn now(&self) -> SimTime {
        self.clock.now()
    }

    fn schedule_at(&mut self, at: SimTime, token: TimerToken) {
        let at = at.max(self.clock.now());
        if let Err(e) = self.push(at, EventType::TimerFired { token }, EventPriority::Normal) {
            tracing::error!("Failed to schedule timer {token:?}: {e}");
            self.overflow = Some(self.event_queue.len());
        }
    }

    fn cancel(&mut self, token: TimerToken) {
        self.cancelled.insert(token);
    }
}
