//! Server tuning options

use std::time::Duration;

/// Transport tuning for a [`Server`](crate::Server)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Interval between server pings
    pub ping_interval: Duration,
    /// Extra grace after a missed ping before the session is dropped
    pub ping_timeout: Duration,
    /// Maximum size of one inbound WebSocket message in bytes
    pub max_payload: usize,
    /// Outbound frames buffered per connection before `emit` fails
    pub write_buffer: usize,
    /// Upgraded sockets waiting for the accept loop
    pub accept_backlog: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_millis(25_000),
            ping_timeout: Duration::from_millis(20_000),
            max_payload: 1_000_000,
            write_buffer: 64,
            accept_backlog: 128,
        }
    }
}

impl Options {
    /// Set the ping interval
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the ping timeout
    pub fn ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    /// Set the maximum inbound message size
    pub fn max_payload(mut self, bytes: usize) -> Self {
        self.max_payload = bytes;
        self
    }

    /// Set the per-connection write buffer
    pub fn write_buffer(mut self, frames: usize) -> Self {
        self.write_buffer = frames;
        self
    }

    /// Set the accept backlog
    pub fn accept_backlog(mut self, sockets: usize) -> Self {
        self.accept_backlog = sockets;
        self
    }

    /// Silence after which a session counts as dead
    pub(crate) fn heartbeat_deadline(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}
