//! Timer ownership and cancel-before-arm discipline.
//!
//! The client owns two timer slots. The session slot is shared by connect
//! and send timers, so arming one kind replaces the other. The playback slot
//! carries playback ticks only. Each slot holds at most one pending arming,
//! and the only way to re-arm an armed slot is an explicit cancel first.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Simulation time, measured as an offset from simulation start.
pub type SimTime = Duration;

/// Purpose of a timer arming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Open a new connection
    Connect = 0,
    /// Issue the next segment request
    Send = 1,
    /// Advance the playback clock
    Playback = 2,
}

impl TimerKind {
    /// Returns the slot this kind is armed on.
    pub fn slot(self) -> TimerSlot {
        match self {
            TimerKind::Connect | TimerKind::Send => TimerSlot::Session,
            TimerKind::Playback => TimerSlot::Playback,
        }
    }

    /// Returns string representation of timer kind for metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            TimerKind::Connect => "Connect",
            TimerKind::Send => "Send",
            TimerKind::Playback => "Playback",
        }
    }
}

impl TryFrom<u8> for TimerKind {
    type Error = TimerError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(TimerKind::Connect),
            1 => Ok(TimerKind::Send),
            2 => Ok(TimerKind::Playback),
            other => Err(TimerError::InvalidKind { code: other }),
        }
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independent timer handle owned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// Connection lifecycle and request pacing
    Session,
    /// Playback clock
    Playback,
}

/// Identifies one specific arming of a slot.
///
/// A fresh token is minted for every arming, so a fire carrying an old token
/// can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub slot: TimerSlot,
    pub generation: u64,
}

/// A pending arming of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub kind: TimerKind,
    pub fire_time: SimTime,
    pub token: TimerToken,
}

/// Errors raised by timer coordination.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimerError {
    /// Slot already holds a pending arming
    #[error("timer slot {slot:?} is already armed with {kind}")]
    AlreadyArmed { slot: TimerSlot, kind: TimerKind },

    /// Slot was released permanently
    #[error("timer slot {slot:?} has been released")]
    Retired { slot: TimerSlot },

    /// Fire does not match the pending arming of its slot
    #[error("unexpected timer fire for {token:?}")]
    UnexpectedFire { token: TimerToken },

    /// Raw timer kind code is not known
    #[error("invalid timer kind code {code}")]
    InvalidKind { code: u8 },
}

/// External discrete-event scheduler.
///
/// Delivers exactly one fire per successful `schedule_at` that is not
/// cancelled before its time.
pub trait Scheduler {
    /// Returns the current simulation time.
    fn now(&self) -> SimTime;

    /// Schedules a fire carrying `token` at time `at`.
    fn schedule_at(&mut self, at: SimTime, token: TimerToken);

    /// Cancels the pending fire carrying `token`, if any.
    fn cancel(&mut self, token: TimerToken);
}

#[derive(Debug, Clone, Default)]
struct SlotState {
    armed: Option<ArmedTimer>,
    retired: bool,
}

/// Sole owner of the client's timers.
#[derive(Debug, Clone, Default)]
pub struct TimerCoordinator {
    session: SlotState,
    playback: SlotState,
    next_generation: u64,
}

impl TimerCoordinator {
    /// Creates a coordinator with both slots idle.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_state(&self, slot: TimerSlot) -> &SlotState {
        match slot {
            TimerSlot::Session => &self.session,
            TimerSlot::Playback => &self.playback,
        }
    }

    fn slot_state_mut(&mut self, slot: TimerSlot) -> &mut SlotState {
        match slot {
            TimerSlot::Session => &mut self.session,
            TimerSlot::Playback => &mut self.playback,
        }
    }

    /// Arms the slot of `kind` to fire at `at`.
    ///
    /// # Errors
    ///
    /// - `TimerError::Retired` - Slot was released permanently
    /// - `TimerError::AlreadyArmed` - Slot has a pending arming that was not cancelled
    pub fn arm(
        &mut self,
        scheduler: &mut dyn Scheduler,
        kind: TimerKind,
        at: SimTime,
    ) -> Result<TimerToken, TimerError> {
        let slot = kind.slot();
        let generation = self.next_generation;
        let state = self.slot_state_mut(slot);

        if state.retired {
            return Err(TimerError::Retired { slot });
        }
        if let Some(armed) = state.armed {
            return Err(TimerError::AlreadyArmed {
                slot,
                kind: armed.kind,
            });
        }

        let token = TimerToken { slot, generation };
        state.armed = Some(ArmedTimer {
            kind,
            fire_time: at,
            token,
        });
        self.next_generation += 1;
        scheduler.schedule_at(at, token);

        tracing::trace!("Armed {} timer at {:.3}s", kind, at.as_secs_f64());
        Ok(token)
    }

    /// Cancels the pending arming of `slot`, returning it if there was one.
    pub fn cancel(&mut self, scheduler: &mut dyn Scheduler, slot: TimerSlot) -> Option<ArmedTimer> {
        let armed = self.slot_state_mut(slot).armed.take()?;
        scheduler.cancel(armed.token);
        Some(armed)
    }

    /// Cancels whatever is pending on the slot of `kind`, then arms `kind` at `at`.
    ///
    /// # Errors
    ///
    /// - `TimerError::Retired` - Slot was released permanently
    pub fn reschedule(
        &mut self,
        scheduler: &mut dyn Scheduler,
        kind: TimerKind,
        at: SimTime,
    ) -> Result<TimerToken, TimerError> {
        self.cancel(scheduler, kind.slot());
        self.arm(scheduler, kind, at)
    }

    /// Cancels and permanently releases `slot`.
    pub fn retire(&mut self, scheduler: &mut dyn Scheduler, slot: TimerSlot) {
        self.cancel(scheduler, slot);
        self.slot_state_mut(slot).retired = true;
    }

    /// Consumes a delivered fire, returning the kind it was armed with.
    ///
    /// # Errors
    ///
    /// - `TimerError::UnexpectedFire` - Token is not the slot's pending arming
    pub fn take_fired(&mut self, token: TimerToken) -> Result<TimerKind, TimerError> {
        let state = self.slot_state_mut(token.slot);
        match state.armed {
            Some(armed) if armed.token == token => {
                state.armed = None;
                Ok(armed.kind)
            }
            _ => Err(TimerError::UnexpectedFire { token }),
        }
    }

    /// Returns the pending arming of `slot`.
    pub fn pending(&self, slot: TimerSlot) -> Option<ArmedTimer> {
        self.slot_state(slot).armed
    }

    /// Returns true if `slot` has a pending arming.
    pub fn is_armed(&self, slot: TimerSlot) -> bool {
        self.slot_state(slot).armed.is_some()
    }

    /// Returns true if `slot` was released permanently.
    pub fn is_retired(&self, slot: TimerSlot) -> bool {
        self.slot_state(slot).retired
    }
}
