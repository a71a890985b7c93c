//! Byte-stream transport abstraction.
//!
//! The client issues connect, send and close through this trait. Transport
//! events come back through the client's `on_*` callbacks, delivered by
//! whatever hosts the client (a simulator, or an adapter over real sockets).

use std::fmt;

use crate::request::RequestDescriptor;

/// State of the underlying connection, owned by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Idle,
    Connecting,
    Connected,
    /// Remote side closed, local side still open
    PeerClosed,
    /// Local close issued, waiting for the remote side
    LocallyClosed,
    Closed,
}

impl TransportState {
    /// Returns true if a graceful close makes sense in this state.
    pub fn is_closable(self) -> bool {
        matches!(
            self,
            TransportState::Connected | TransportState::Connecting | TransportState::PeerClosed
        )
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportState::Idle => "idle",
            TransportState::Connecting => "connecting",
            TransportState::Connected => "connected",
            TransportState::PeerClosed => "peer-closed",
            TransportState::LocallyClosed => "locally-closed",
            TransportState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Operations the client needs from a reliable, ordered byte stream.
pub trait Transport {
    /// Starts an active open.
    fn connect(&mut self);

    /// Sends a request over the open connection.
    fn send(&mut self, request: RequestDescriptor);

    /// Starts a graceful close.
    fn close(&mut self);

    /// Tears the connection down without a graceful close.
    fn destroy(&mut self);

    /// Current connection state.
    fn state(&self) -> TransportState;
}
