//! Segment request construction.

use crate::config::ClientConfig;
use crate::session::Session;
use crate::timer::SimTime;
use crate::trace::TraceTable;

/// Request handed to the transport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestDescriptor {
    /// Request size in bytes, at least 1
    pub request_length: u64,
    /// Reply size the server should send, at least 1
    pub expected_reply_length: u64,
    /// Whether the server closes the connection after replying
    pub server_close: bool,
    /// Creation time, for round-trip measurement
    pub created_at: SimTime,
    /// Trace key this request was sized from
    pub target_index: f64,
}

/// Result of sizing a request from the trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// Trace had an exact entry for the target index
    Hit,
    /// No entry; the configured reply length was used
    Miss,
}

/// Builds requests from configuration, session counters and the trace.
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    config: &'a ClientConfig,
    trace: &'a TraceTable,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(config: &'a ClientConfig, trace: &'a TraceTable) -> Self {
        Self { config, trace }
    }

    /// Trace key of the next unseen segment.
    ///
    /// Counts from the end of the video: with all requests remaining the
    /// target is 1, and each issued request moves it forward by one.
    pub fn target_index(&self, session: &Session) -> f64 {
        f64::from(self.config.video_duration) + 1.0 - f64::from(session.requests_remaining())
    }

    /// Composes the next request. Does not send it.
    pub fn build(&self, session: &Session, now: SimTime) -> (RequestDescriptor, LookupOutcome) {
        let target_index = self.target_index(session);

        let (reply_length, outcome) = match self.trace.lookup(target_index) {
            Some(size) => (size, LookupOutcome::Hit),
            None => {
                tracing::warn!(
                    "No matching time in trace for target index {target_index}, using default reply length {}",
                    self.config.reply_length
                );
                (self.config.reply_length, LookupOutcome::Miss)
            }
        };

        let descriptor = RequestDescriptor {
            request_length: self.config.request_length.max(1),
            expected_reply_length: reply_length.max(1),
            server_close: false,
            created_at: now,
            target_index,
        };

        (descriptor, outcome)
    }
}
