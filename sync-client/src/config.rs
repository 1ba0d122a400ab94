//! Client configuration.

use std::time::Duration;

/// Largest frame payload, and largest reassembled message, accepted from a relay.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Timeouts and limits shared by the relay client and the NIP-05 resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bound on TCP dial + TLS + upgrade handshake.
    pub connect_timeout: Duration,
    /// How long one read waits before re-checking cancellation.
    pub read_poll_interval: Duration,
    /// Bound on one NIP-05 HTTP request.
    pub nip05_timeout: Duration,
    /// Largest inbound frame or message, in bytes.
    pub max_message_size: usize,
    /// Bound on best-effort CLOSE and close-frame writes.
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_poll_interval: Duration::from_secs(30),
            nip05_timeout: Duration::from_secs(10),
            max_message_size: MAX_MESSAGE_SIZE,
            close_timeout: Duration::from_secs(2),
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the read poll interval.
    pub fn with_read_poll_interval(mut self, interval: Duration) -> Self {
        self.read_poll_interval = interval;
        self
    }

    /// Set the NIP-05 request timeout.
    pub fn with_nip05_timeout(mut self, timeout: Duration) -> Self {
        self.nip05_timeout = timeout;
        self
    }

    /// Set the bound on best-effort close writes.
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the inbound message size limit.
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }
}
