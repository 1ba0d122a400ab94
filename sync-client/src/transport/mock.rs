//! Mock transport for testing.
//!
//! Allows queueing relay messages and capturing sent messages for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock transport for testing.
///
/// Allows queueing relay messages and capturing sent messages for verification.
/// By default an empty queue reads as a closed connection; after
/// [`hold_open`](Self::hold_open) it instead blocks forever, like an idle relay.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    sent_messages: Vec<String>,
    receive_queue: VecDeque<String>,
    hold_open: bool,
    stall_sends: bool,
    close_calls: usize,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

enum Next {
    Ready(Result<String, TransportError>),
    Idle,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queue a message to be returned by the next `recv()` call.
    pub fn queue_response(&self, text: impl Into<String>) {
        self.lock().receive_queue.push_back(text.into());
    }

    /// Make `recv()` wait forever once the queue is empty.
    pub fn hold_open(&self) {
        self.lock().hold_open = true;
    }

    /// Make every later `send()` wait forever, like a peer that stopped reading.
    pub fn stall_sends(&self) {
        self.lock().stall_sends = true;
    }

    /// Get all messages that were sent.
    pub fn sent_messages(&self) -> Vec<String> {
        self.lock().sent_messages.clone()
    }

    /// Get the last message that was sent.
    pub fn last_sent(&self) -> Option<String> {
        self.lock().sent_messages.last().cloned()
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        self.lock().connected_address.clone()
    }

    /// How many times `close()` was called.
    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        self.lock().fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        self.lock().fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        self.lock().fail_next_recv = Some(error.to_string());
    }

    /// Clear all state (messages, queue, connection).
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }

    fn next(&self) -> Next {
        let mut inner = self.lock();

        if !inner.connected {
            return Next::Ready(Err(TransportError::NotConnected));
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_recv.take() {
            return Next::Ready(Err(TransportError::ReceiveFailed(error)));
        }

        match inner.receive_queue.pop_front() {
            Some(text) => Next::Ready(Ok(text)),
            None if inner.hold_open => Next::Idle,
            None => Next::Ready(Err(TransportError::ConnectionClosed)),
        }
    }
}

impl MockTransport {
    /// Record an outgoing message. Returns `true` when the send should stall.
    fn record_send(&self, text: &str) -> Result<bool, TransportError> {
        let mut inner = self.lock();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        if inner.stall_sends {
            return Ok(true);
        }
        inner.sent_messages.push(text.to_string());
        Ok(false)
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let mut inner = self.lock();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.record_send(text)? {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn recv(&self) -> Result<String, TransportError> {
        match self.next() {
            Next::Ready(result) => result,
            Next::Idle => std::future::pending().await,
        }
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn close(&self) -> Result<(), TransportError> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.close_calls += 1;
        Ok(())
    }
}
