//! # sync-client
//!
//! Nostr relay client for relaysync.
//!
//! This is the I/O layer: it connects to relays, runs subscriptions and
//! resolves identities, using sync-core for the protocol logic.
//!
//! ## Features
//!
//! - **WebSocket from first principles**: RFC 6455 handshake and framing over
//!   TCP or rustls TLS
//! - **Verified delivery**: sinks only ever receive [`VerifiedEvent`]s
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//! - **Cooperative cancellation**: subscriptions observe a `CancellationToken`
//! - **NIP-05**: `name@domain` resolution with relay hints
//!
//! ## Example
//!
//! ```ignore
//! use relaysync_client::{resolve_identity, ClientConfig, Nip05Resolver, RelayClient};
//! use relaysync_types::Filter;
//!
//! let config = ClientConfig::default();
//! let identity = resolve_identity("_@example.com", &Nip05Resolver::new(&config)?).await?;
//!
//! let client = RelayClient::websocket("wss://relay.example.com", config);
//! client.connect().await?;
//! let summary = client
//!     .subscribe(Filter::new().authors([identity.hex]), &sink, &cancel)
//!     .await?;
//! ```
//!
//! [`VerifiedEvent`]: relaysync_types::VerifiedEvent

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod nip05;
pub mod relay;
pub mod transport;

pub use config::{ClientConfig, MAX_MESSAGE_SIZE};
pub use nip05::{
    resolve_identity, IdentityError, IdentitySource, Nip05Error, Nip05Resolution, Nip05Resolver,
    ResolvedIdentity,
};
pub use relay::{ClientError, EventSink, RelayClient, SinkError, SubscriptionSummary};
pub use transport::{
    FrameError, HandshakeError, MockTransport, Transport, TransportError, WebSocketTransport,
};
