//! Per-connection request counters and reply watermarks.

/// Counters of the active streaming session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    requests_remaining: u32,
    expected_reply_length: u64,
    bytes_received_total: u64,
    bytes_received_at_last_reply: u64,
}

impl Session {
    /// Creates a session that will issue `requests` requests.
    pub fn new(requests: u32, expected_reply_length: u64) -> Self {
        Self {
            requests_remaining: requests,
            expected_reply_length: expected_reply_length.max(1),
            ..Default::default()
        }
    }

    /// Requests still to be issued on this connection.
    pub fn requests_remaining(&self) -> u32 {
        self.requests_remaining
    }

    /// Starts a new connection with `requests` requests to issue.
    pub fn reset_requests(&mut self, requests: u32) {
        self.requests_remaining = requests;
    }

    /// Counts one issued request. Never goes below zero.
    pub fn consume_request(&mut self) {
        self.requests_remaining = self.requests_remaining.saturating_sub(1);
    }

    /// Reply size expected for the request in flight.
    pub fn expected_reply_length(&self) -> u64 {
        self.expected_reply_length
    }

    /// Records the reply size of the request just sent.
    pub fn set_expected_reply_length(&mut self, length: u64) {
        self.expected_reply_length = length.max(1);
    }

    /// Adds newly arrived bytes to the running total.
    pub fn record_bytes(&mut self, increment: u64) {
        self.bytes_received_total = self.bytes_received_total.saturating_add(increment);
    }

    /// Total bytes received over the client's lifetime.
    pub fn bytes_received_total(&self) -> u64 {
        self.bytes_received_total
    }

    /// Bytes received since the last completed reply.
    pub fn accumulated_reply_length(&self) -> u64 {
        self.bytes_received_total - self.bytes_received_at_last_reply
    }

    /// Marks everything received so far as belonging to completed replies.
    pub fn advance_reply_watermark(&mut self) {
        self.bytes_received_at_last_reply = self.bytes_received_total;
    }
}
