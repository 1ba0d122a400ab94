//! RelayClient - one connection to one Nostr relay.
//!
//! This module provides [`RelayClient`], which runs REQ/EVENT/EOSE
//! subscriptions and hands verified events to an [`EventSink`].
//!
//! # Architecture
//!
//! RelayClient uses a pure state machine (from sync-core) for protocol logic
//! and interprets the actions to perform actual I/O via the Transport trait.
//!
//! ```text
//! Caller → RelayClient → Transport → Network
//!               ↓
//!          sync-core (pure state machine, event verification)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use relaysync_client::{ClientConfig, RelayClient};
//! use relaysync_types::Filter;
//! use tokio_util::sync::CancellationToken;
//!
//! let client = RelayClient::websocket("wss://relay.example.com", ClientConfig::default());
//! client.connect().await?;
//! let sink = |event: VerifiedEvent| -> Result<(), SinkError> {
//!     println!("{}", event.id);
//!     Ok(())
//! };
//! let summary = client
//!     .subscribe(Filter::new().kinds([1]).limit(10), &sink, &CancellationToken::new())
//!     .await?;
//! client.close().await?;
//! ```

use async_trait::async_trait;
use relaysync_core::{Action, Input, SubscriptionEnd, SubscriptionIds, SubscriptionState};
use relaysync_types::{ClientMessage, Filter, RelayMessage, VerifiedEvent};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::transport::{Transport, TransportError, WebSocketTransport};

/// Error type returned by sinks.
pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

/// Receives verified events from a subscription.
///
/// `subscribe` awaits each delivery, so a slow sink slows the read loop.
/// Returning an error aborts the subscription.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Accept one verified event.
    async fn deliver(&self, event: VerifiedEvent) -> Result<(), SinkError>;
}

#[async_trait]
impl<F> EventSink for F
where
    F: Fn(VerifiedEvent) -> Result<(), SinkError> + Send + Sync,
{
    async fn deliver(&self, event: VerifiedEvent) -> Result<(), SinkError> {
        self(event)
    }
}

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Not connected to the relay.
    #[error("not connected")]
    NotConnected,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The sink refused an event.
    #[error("sink error: {0}")]
    Sink(#[source] SinkError),

    /// The caller cancelled the subscription.
    #[error("subscription cancelled")]
    Cancelled,
}

/// Outcome of a subscription that ended without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSummary {
    /// Id used on the wire.
    pub subscription_id: String,
    /// EOSE, or CLOSED with the relay's reason.
    pub end: SubscriptionEnd,
    /// Events handed to the sink.
    pub delivered: u64,
    /// Events dropped because verification failed.
    pub rejected: u64,
    /// Relay messages that could not be parsed.
    pub malformed: u64,
}

/// A client for one relay.
pub struct RelayClient<T: Transport> {
    url: String,
    transport: T,
    config: ClientConfig,
    ids: SubscriptionIds,
}

impl RelayClient<WebSocketTransport> {
    /// Create a client that speaks WebSocket to `url`.
    pub fn websocket(url: impl Into<String>, config: ClientConfig) -> Self {
        let transport = WebSocketTransport::new(config.clone());
        Self::new(url, transport, config)
    }
}

impl<T: Transport> RelayClient<T> {
    /// Create a new RelayClient over any transport.
    pub fn new(url: impl Into<String>, transport: T, config: ClientConfig) -> Self {
        Self {
            url: url.into(),
            transport,
            config,
            ids: SubscriptionIds::new(),
        }
    }

    /// Use a specific subscription id generator.
    pub fn with_subscription_ids(mut self, ids: SubscriptionIds) -> Self {
        self.ids = ids;
        self
    }

    /// The relay URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open the connection.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.transport.connect(&self.url).await?;
        info!(relay = %self.url, "connected");
        Ok(())
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.transport.close().await?;
        Ok(())
    }

    /// Run one subscription until EOSE, CLOSED, cancellation or failure.
    ///
    /// Every event is verified before it reaches `sink`; events that fail
    /// verification are counted and dropped. Cancellation is observed while
    /// waiting for the relay, and triggers a best-effort CLOSE.
    pub async fn subscribe<S>(
        &self,
        filter: Filter,
        sink: &S,
        cancel: &CancellationToken,
    ) -> Result<SubscriptionSummary, ClientError>
    where
        S: EventSink + ?Sized,
    {
        if !self.transport.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let subscription_id = self.ids.next_id();
        let mut summary = SubscriptionSummary {
            subscription_id: subscription_id.clone(),
            end: SubscriptionEnd::Eose,
            delivered: 0,
            rejected: 0,
            malformed: 0,
        };
        let mut lost: Option<TransportError> = None;

        let (mut state, mut actions) = SubscriptionState::new().on_event(Input::Subscribe {
            id: subscription_id.clone(),
            filter,
        });
        debug!(relay = %self.url, subscription = %subscription_id, "subscribing");

        loop {
            for action in actions.drain(..) {
                match action {
                    Action::Send(message) => self.send(&message).await?,
                    Action::SendClose(message) => self.send_close(&message).await,
                    Action::Deliver(event) => {
                        if let Err(e) = sink.deliver(event).await {
                            self.send_close(&ClientMessage::close(subscription_id.clone()))
                                .await;
                            return Err(ClientError::Sink(e));
                        }
                        summary.delivered += 1;
                    }
                    Action::Reject { event_id, error } => {
                        summary.rejected += 1;
                        debug!(relay = %self.url, event = %event_id, %error, "dropped unverifiable event");
                    }
                    Action::Notice(message) => {
                        info!(relay = %self.url, notice = %message, "relay notice");
                    }
                    Action::Ignore { reason } => {
                        debug!(relay = %self.url, reason, "ignored relay message");
                    }
                    Action::Finish(end) => {
                        return self.finish(summary, end, lost.take());
                    }
                }
            }

            let input = tokio::select! {
                biased;
                _ = cancel.cancelled() => Input::Cancelled,
                read = tokio::time::timeout(self.config.read_poll_interval, self.transport.recv()) => {
                    match read {
                        // Poll interval elapsed; re-check cancellation.
                        Err(_) => continue,
                        Ok(Ok(text)) => match RelayMessage::from_json(&text) {
                            Ok(message) => Input::Message(message),
                            Err(e) => {
                                summary.malformed += 1;
                                debug!(relay = %self.url, error = %e, "skipped malformed relay message");
                                continue;
                            }
                        },
                        Ok(Err(e)) => {
                            let reason = e.to_string();
                            lost = Some(e);
                            Input::ConnectionLost { reason }
                        }
                    }
                }
            };

            let (next_state, next_actions) = state.on_event(input);
            state = next_state;
            actions = next_actions;
        }
    }

    fn finish(
        &self,
        mut summary: SubscriptionSummary,
        end: SubscriptionEnd,
        lost: Option<TransportError>,
    ) -> Result<SubscriptionSummary, ClientError> {
        if !end.is_success() {
            return match end {
                SubscriptionEnd::ConnectionLost { .. } => {
                    Err(lost.unwrap_or(TransportError::ConnectionClosed).into())
                }
                _ => {
                    info!(relay = %self.url, subscription = %summary.subscription_id, "subscription cancelled");
                    Err(ClientError::Cancelled)
                }
            };
        }

        if let SubscriptionEnd::Closed { reason } = &end {
            warn!(relay = %self.url, subscription = %summary.subscription_id, %reason, "relay closed subscription");
        }
        info!(
            relay = %self.url,
            subscription = %summary.subscription_id,
            delivered = summary.delivered,
            rejected = summary.rejected,
            malformed = summary.malformed,
            end = %end,
            "subscription finished"
        );
        summary.end = end;
        Ok(summary)
    }

    async fn send(&self, message: &ClientMessage) -> Result<(), ClientError> {
        let text = message
            .to_json()
            .map_err(|e| ClientError::Serialization(e.to_string()))?;
        self.transport.send(&text).await?;
        Ok(())
    }

    /// Best effort: bounded by `close_timeout` so a stuck writer cannot hold
    /// up cancellation.
    async fn send_close(&self, message: &ClientMessage) {
        match tokio::time::timeout(self.config.close_timeout, self.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(relay = %self.url, error = %e, "failed to send CLOSE"),
            Err(_) => warn!(relay = %self.url, "CLOSE send timed out"),
        }
    }
}
