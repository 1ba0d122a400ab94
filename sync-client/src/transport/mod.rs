//! Transport abstraction for relaysync.
//!
//! This module provides a pluggable transport layer that abstracts
//! the underlying connection mechanism (WebSocket, mock for testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection to a relay URL
//! - `send()` transmits one JSON text message
//! - `recv()` receives one JSON text message
//! - `close()` gracefully terminates
//!
//! # Example
//!
//! ```ignore
//! let transport = WebSocketTransport::new(ClientConfig::default());
//! transport.connect("wss://relay.example.com").await?;
//! transport.send(r#"["REQ","sub",{"kinds":[1]}]"#).await?;
//! let response = transport.recv().await?;
//! ```

pub mod frame;
pub mod handshake;
mod mock;
#[cfg(test)]
pub(crate) mod test_server;
mod ws;

pub use frame::FrameError;
pub use handshake::HandshakeError;
pub use mock::MockTransport;
pub use ws::{WebSocketTransport, WsConnection};

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// Connection timeout.
    #[error("connection timeout")]
    Timeout,

    /// Relay URL is unusable.
    #[error("invalid relay URL: {0}")]
    InvalidUrl(String),

    /// WebSocket upgrade failed.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Relay violated the framing protocol.
    #[error("frame error: {0}")]
    Frame(#[source] FrameError),

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Closed => Self::ConnectionClosed,
            FrameError::Io(io) => Self::Io(io),
            other => Self::Frame(other),
        }
    }
}

/// Transport trait for sending and receiving relay messages.
///
/// Implementations handle the underlying connection mechanism
/// (WebSocket, mock, etc).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the relay at the given URL.
    async fn connect(&self, url: &str) -> Result<(), TransportError>;

    /// Send one text message.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Receive one text message.
    ///
    /// Blocks until a message is available or the connection closes. Must be
    /// cancel-safe: dropping the future before it completes loses no data.
    async fn recv(&self) -> Result<String, TransportError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection gracefully. Calling it again is a no-op.
    async fn close(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_map_to_transport_errors() {
        assert!(matches!(
            TransportError::from(FrameError::Closed),
            TransportError::ConnectionClosed
        ));
        assert!(matches!(
            TransportError::from(FrameError::UnexpectedContinuation),
            TransportError::Frame(FrameError::UnexpectedContinuation)
        ));
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert!(matches!(
            TransportError::from(FrameError::Io(io)),
            TransportError::Io(_)
        ));
    }
}
