//! Playback clock and buffer fill state machine.
//!
//! The buffer level counts fully downloaded segments. Playback ticks do not
//! drain it: only segment arrival is modelled, so the level is monotonic.

use std::fmt;
use std::time::Duration;

use crate::session::Session;

/// Fixed interval between playback ticks.
pub const PLAYBACK_TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before the next request when playback asks for more data.
pub const PLAYBACK_SEND_DELAY: Duration = Duration::from_secs(1);

/// Playback mode. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Pre-roll or stall
    #[default]
    Buffering,
    /// Active viewing
    Playing,
    /// Playback reached the end of the video
    Stopped,
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackMode::Buffering => write!(f, "buffering"),
            PlaybackMode::Playing => write!(f, "playing"),
            PlaybackMode::Stopped => write!(f, "stopped"),
        }
    }
}

/// What the client must do after a playback tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Playback already stopped; nothing happened
    Ignored,
    /// Pointer reached the end; the playback timer must be released
    Finished,
    /// Playback continues
    Continue {
        /// Arm the next tick one interval ahead
        rearm_tick: bool,
        /// Schedule the next request
        request_send: bool,
    },
}

/// Buffer level, playback position and mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    buffer_level: u32,
    playback_pointer: u32,
    mode: PlaybackMode,
    video_duration: u32,
}

impl PlaybackState {
    /// Creates playback state for a video of `video_duration` segments.
    pub fn new(video_duration: u32) -> Self {
        Self {
            video_duration,
            ..Default::default()
        }
    }

    pub fn buffer_level(&self) -> u32 {
        self.buffer_level
    }

    pub fn playback_pointer(&self) -> u32 {
        self.playback_pointer
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn video_duration(&self) -> u32 {
        self.video_duration
    }

    pub fn is_stopped(&self) -> bool {
        self.mode == PlaybackMode::Stopped
    }

    /// Ends playback where it is. Used when the client is released before
    /// the video finishes.
    pub fn stop(&mut self) {
        self.mode = PlaybackMode::Stopped;
    }

    /// Moves a completed reply into the buffer.
    ///
    /// Returns true if the bytes accumulated since the last completed reply
    /// cover the expected reply length, in which case the watermark advances
    /// and the buffer grows by one segment.
    pub fn on_reply_complete(&mut self, session: &mut Session) -> bool {
        if session.accumulated_reply_length() < session.expected_reply_length() {
            return false;
        }

        session.advance_reply_watermark();
        self.buffer_level += 1;
        true
    }

    /// Advances playback by one tick.
    pub fn on_playback_tick(&mut self, requests_remaining: u32) -> TickOutcome {
        if self.is_stopped() {
            return TickOutcome::Ignored;
        }

        if self.playback_pointer == 0 {
            self.mode = PlaybackMode::Playing;
        }
        self.playback_pointer += 1;

        if self.playback_pointer >= self.video_duration {
            self.mode = PlaybackMode::Stopped;
            return TickOutcome::Finished;
        }

        let rearm_tick = self.buffer_level > 0;
        let mut request_send = false;
        if self.mode != PlaybackMode::Buffering && requests_remaining > 0 {
            self.mode = PlaybackMode::Buffering;
            request_send = true;
        }

        TickOutcome::Continue {
            rearm_tick,
            request_send,
        }
    }
}
