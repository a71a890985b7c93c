//! Simulated byte-stream transport and link model.
//!
//! `SimulatedTransport` is what the client talks to. It records the client's
//! actions in an outbox tagged with the connection epoch. The simulation
//! drains the outbox and asks `NetworkModel` when the matching transport
//! events come back.

use std::time::Duration;

use vrstream_core::{RequestDescriptor, SimTime, Transport, TransportState};

use super::clock::DeterministicRng;
use super::events::EventType;

/// Error code reported when a connection attempt is refused.
pub const CONNECTION_REFUSED: i32 = 111;

/// Error code reported when a transfer is cut off.
pub const CONNECTION_RESET: i32 = 104;

/// Link characteristics between client and server.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkProfile {
    /// Time from active open to established
    pub connect_latency: Duration,
    /// One-way propagation delay
    pub latency: Duration,
    /// Reply throughput
    pub bandwidth_bytes_per_sec: u64,
    /// Size of each delivered data chunk
    pub chunk_size: u64,
    /// Probability that a connection attempt fails
    pub connect_failure_probability: f64,
    /// Probability that a reply transfer is cut off halfway
    pub transfer_failure_probability: f64,
}

impl Default for LinkProfile {
    fn default() -> Self {
        Self {
            connect_latency: Duration::from_millis(30),
            latency: Duration::from_millis(10),
            bandwidth_bytes_per_sec: 12_500_000, // 100 Mbit/s
            chunk_size: 64 * 1024,
            connect_failure_probability: 0.0,
            transfer_failure_probability: 0.0,
        }
    }
}

/// Action the client asked of the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportAction {
    Connect,
    Send(RequestDescriptor),
    Close,
}

/// Transport handed to the client during simulation.
#[derive(Debug, Default)]
pub struct SimulatedTransport {
    state: TransportState,
    epoch: u64,
    live_epoch: Option<u64>,
    outbox: Vec<(u64, TransportAction)>,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Epoch of the most recent connection attempt.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns true if events of `epoch` should still reach the client.
    pub fn is_current(&self, epoch: u64) -> bool {
        self.live_epoch == Some(epoch)
    }

    /// Takes the actions recorded since the last drain.
    pub fn drain_outbox(&mut self) -> Vec<(u64, TransportAction)> {
        std::mem::take(&mut self.outbox)
    }

    /// Open completed. A close issued while connecting takes precedence.
    pub fn mark_connected(&mut self) {
        if self.state == TransportState::Connecting {
            self.state = TransportState::Connected;
        }
    }

    /// Connection is gone; later events of its epoch are dropped.
    pub fn mark_closed(&mut self) {
        self.state = TransportState::Closed;
        self.live_epoch = None;
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self) {
        self.epoch += 1;
        self.live_epoch = Some(self.epoch);
        self.state = TransportState::Connecting;
        self.outbox.push((self.epoch, TransportAction::Connect));
    }

    fn send(&mut self, request: RequestDescriptor) {
        self.outbox.push((self.epoch, TransportAction::Send(request)));
    }

    fn close(&mut self) {
        self.state = TransportState::LocallyClosed;
        self.outbox.push((self.epoch, TransportAction::Close));
    }

    fn destroy(&mut self) {
        self.state = TransportState::Closed;
        self.live_epoch = None;
        self.outbox.clear();
    }

    fn state(&self) -> TransportState {
        self.state
    }
}

/// Turns transport actions into timed transport events.
#[derive(Debug, Clone)]
pub struct NetworkModel {
    profile: LinkProfile,
    link_free_at: SimTime,
    severed: Option<(u64, SimTime)>,
}

impl NetworkModel {
    pub fn new(profile: LinkProfile) -> Self {
        Self {
            profile,
            link_free_at: SimTime::ZERO,
            severed: None,
        }
    }

    /// Plans the transport events caused by `action`, issued at `now` on
    /// connection `epoch`.
    pub fn plan(
        &mut self,
        action: &TransportAction,
        now: SimTime,
        epoch: u64,
        rng: &mut DeterministicRng,
    ) -> Vec<(SimTime, EventType)> {
        match action {
            TransportAction::Connect => self.plan_connect(now, epoch, rng),
            TransportAction::Send(request) => self.plan_reply(request, now, epoch, rng),
            TransportAction::Close => {
                vec![(now + self.profile.latency * 2, EventType::Closed { epoch })]
            }
        }
    }

    fn plan_connect(
        &mut self,
        now: SimTime,
        epoch: u64,
        rng: &mut DeterministicRng,
    ) -> Vec<(SimTime, EventType)> {
        let at = now + self.profile.connect_latency;

        if rng.random_bool(self.profile.connect_failure_probability) {
            tracing::debug!("Connection attempt {epoch} will be refused");
            self.severed = Some((epoch, at));
            return vec![(
                at,
                EventType::Failure {
                    epoch,
                    code: CONNECTION_REFUSED,
                },
            )];
        }

        self.link_free_at = self.link_free_at.max(at);
        vec![(at, EventType::Established { epoch })]
    }

    fn plan_reply(
        &mut self,
        request: &RequestDescriptor,
        now: SimTime,
        epoch: u64,
        rng: &mut DeterministicRng,
    ) -> Vec<(SimTime, EventType)> {
        let cutoff = match self.severed {
            Some((severed_epoch, at)) if severed_epoch == epoch => Some(at),
            _ => None,
        };
        if cutoff.is_some_and(|at| at <= now) {
            return Vec::new();
        }

        let total = request.expected_reply_length.max(1);
        let chunk_size = self.profile.chunk_size.max(1);
        let bandwidth = self.profile.bandwidth_bytes_per_sec.max(1) as f64;
        let begin = (now + self.profile.latency).max(self.link_free_at);

        let fails = rng.random_bool(self.profile.transfer_failure_probability);
        let deliver_up_to = if fails { total / 2 } else { total };

        let mut events = Vec::new();
        let mut sent = 0u64;
        while sent < deliver_up_to {
            let bytes = chunk_size.min(deliver_up_to - sent);
            sent += bytes;
            let at = begin
                + Duration::from_secs_f64(sent as f64 / bandwidth)
                + self.profile.latency;
            if cutoff.is_some_and(|limit| at >= limit) {
                return events;
            }
            events.push((at, EventType::DataArrived { epoch, bytes }));
        }

        let transfer_end = begin + Duration::from_secs_f64(sent as f64 / bandwidth);
        self.link_free_at = transfer_end;

        if fails {
            let at = transfer_end + self.profile.latency;
            tracing::debug!("Transfer on connection {epoch} will be reset after {sent} bytes");
            self.severed = Some((epoch, at));
            events.push((
                at,
                EventType::Failure {
                    epoch,
                    code: CONNECTION_RESET,
                },
            ));
        }

        events
    }
}
