//! Invariant checking framework for simulation validation.
//!
//! Invariants look at consecutive client snapshots, so each check sees the
//! state before and after one dispatched event.

use std::fmt;

use vrstream_core::{ClientSnapshot, ConnectionPhase, PlaybackMode, SimTime};

/// Violation of a simulation invariant.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Simulation time of the offending event
    pub time: SimTime,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated at {:.3}s: {}",
            self.invariant,
            self.time.as_secs_f64(),
            self.description
        )
    }
}

/// Trait for checking simulation invariants.
pub trait Invariant {
    /// Checks if invariant holds between `previous` and `current`.
    ///
    /// `previous` is `None` for the first check of a run.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the invariant condition is not met.
    fn check(
        &self,
        previous: Option<&ClientSnapshot>,
        current: &ClientSnapshot,
    ) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;

    /// Builds a violation of this invariant at the time of `current`.
    fn violation(&self, current: &ClientSnapshot, description: String) -> InvariantViolation {
        InvariantViolation {
            invariant: self.name().to_string(),
            description,
            time: current.time,
        }
    }
}

/// Requests remaining never grow within one established connection.
pub struct RequestsNonIncreasingInvariant;

impl Invariant for RequestsNonIncreasingInvariant {
    fn check(
        &self,
        previous: Option<&ClientSnapshot>,
        current: &ClientSnapshot,
    ) -> Result<(), InvariantViolation> {
        let Some(previous) = previous else {
            return Ok(());
        };

        // A fresh establishment resets the count
        let same_connection = previous.phase == ConnectionPhase::Established
            && previous.stats.connects == current.stats.connects;

        if same_connection && current.requests_remaining > previous.requests_remaining {
            return Err(self.violation(
                current,
                format!(
                    "Requests remaining grew from {} to {}",
                    previous.requests_remaining, current.requests_remaining
                ),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "RequestsNonIncreasing"
    }
}

/// Playback pointer advances one segment at a time and stops at the end.
pub struct PlaybackBoundedInvariant;

impl Invariant for PlaybackBoundedInvariant {
    fn check(
        &self,
        previous: Option<&ClientSnapshot>,
        current: &ClientSnapshot,
    ) -> Result<(), InvariantViolation> {
        if current.playback_pointer > current.video_duration {
            return Err(self.violation(
                current,
                format!(
                    "Playback pointer {} is past video duration {}",
                    current.playback_pointer, current.video_duration
                ),
            ));
        }

        if current.playback_pointer == current.video_duration
            && current.video_duration > 0
            && current.mode != PlaybackMode::Stopped
        {
            return Err(self.violation(
                current,
                format!("Playback reached the end but is {}", current.mode),
            ));
        }

        if let Some(previous) = previous {
            let advanced = i64::from(current.playback_pointer) - i64::from(previous.playback_pointer);
            if !(0..=1).contains(&advanced) {
                return Err(self.violation(
                    current,
                    format!(
                        "Playback pointer moved from {} to {}",
                        previous.playback_pointer, current.playback_pointer
                    ),
                ));
            }
            if previous.mode == PlaybackMode::Stopped && current.mode != PlaybackMode::Stopped {
                return Err(self.violation(current, "Playback left the stopped mode".to_string()));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "PlaybackBounded"
    }
}

/// Stopped playback holds no tick, and a terminated client holds no timers.
pub struct TimerDisciplineInvariant;

impl Invariant for TimerDisciplineInvariant {
    fn check(
        &self,
        _previous: Option<&ClientSnapshot>,
        current: &ClientSnapshot,
    ) -> Result<(), InvariantViolation> {
        if current.mode == PlaybackMode::Stopped && current.playback_timer.is_some() {
            return Err(self.violation(
                current,
                "Playback tick armed after playback stopped".to_string(),
            ));
        }

        if current.terminated
            && (current.session_timer.is_some() || current.playback_timer.is_some())
        {
            return Err(self.violation(
                current,
                "Terminated client still holds a pending timer".to_string(),
            ));
        }

        if let Some(timer) = current.session_timer {
            if timer.fire_time < current.time {
                return Err(self.violation(
                    current,
                    format!(
                        "{} timer armed in the past at {:.3}s",
                        timer.kind,
                        timer.fire_time.as_secs_f64()
                    ),
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "TimerDiscipline"
    }
}
