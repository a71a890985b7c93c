//! Recording doubles for the transport and scheduler.
//!
//! Available in unit tests and to other crates through the `test-utils`
//! feature.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;

use crate::request::RequestDescriptor;
use crate::timer::{Scheduler, SimTime, TimerToken};
use crate::transport::{Transport, TransportState};

/// A call made on [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    Connect,
    Send(RequestDescriptor),
    Close,
    Destroy,
}

/// Transport that records calls and follows the obvious state changes.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    calls: Vec<TransportCall>,
    state: TransportState,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forces the reported state, e.g. to simulate an established connection.
    pub fn set_state(&mut self, state: TransportState) {
        self.state = state;
    }

    pub fn calls(&self) -> &[TransportCall] {
        &self.calls
    }

    /// Requests sent so far, in order.
    pub fn sent_requests(&self) -> Vec<RequestDescriptor> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Send(request) => Some(*request),
                _ => None,
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn connect(&mut self) {
        self.calls.push(TransportCall::Connect);
        self.state = TransportState::Connecting;
    }

    fn send(&mut self, request: RequestDescriptor) {
        self.calls.push(TransportCall::Send(request));
    }

    fn close(&mut self) {
        self.calls.push(TransportCall::Close);
        self.state = TransportState::LocallyClosed;
    }

    fn destroy(&mut self) {
        self.calls.push(TransportCall::Destroy);
        self.state = TransportState::Closed;
    }

    fn state(&self) -> TransportState {
        self.state
    }
}

/// Scheduler with a manually driven clock.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: SimTime,
    pending: BTreeMap<(SimTime, u64), TimerToken>,
    cancelled: HashSet<TimerToken>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&mut self, now: SimTime) {
        self.now = now;
    }

    /// Number of scheduled, not yet cancelled or popped fires.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn was_cancelled(&self, token: TimerToken) -> bool {
        self.cancelled.contains(&token)
    }

    /// Earliest pending fire as `(time, token)`.
    pub fn next_fire(&self) -> Option<(SimTime, TimerToken)> {
        self.pending
            .iter()
            .next()
            .map(|(&(time, _), &token)| (time, token))
    }

    /// Removes the earliest pending fire and moves the clock to its time.
    pub fn pop_next(&mut self) -> Option<TimerToken> {
        let (&key, &token) = self.pending.iter().next()?;
        self.pending.remove(&key);
        self.now = self.now.max(key.0);
        Some(token)
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_at(&mut self, at: SimTime, token: TimerToken) {
        self.pending.insert((at, token.generation), token);
    }

    fn cancel(&mut self, token: TimerToken) {
        let before = self.pending.len();
        self.pending.retain(|_, pending| *pending != token);
        if self.pending.len() < before {
            self.cancelled.insert(token);
        }
    }
}

/// Writes a trace file with a header and the given `(time, size)` rows.
///
/// # Panics
///
/// Panics if the temporary file cannot be created or written.
pub fn write_trace_file(rows: &[(f64, u64)]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp trace file");
    writeln!(file, "Time,Size").expect("write trace header");
    for (time, size) in rows {
        writeln!(file, "{time},{size}").expect("write trace row");
    }
    file.flush().expect("flush trace file");
    file
}
