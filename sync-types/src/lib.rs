//! # sync-types
//!
//! Nostr wire types for the relaysync backfill client.
//!
//! This crate provides the foundational types used across all relaysync crates:
//! - [`Filter`] - Request-scoped subscription filter
//! - [`Event`] / [`VerifiedEvent`] - Wire-format events and the only form a sink accepts
//! - [`ClientMessage`] / [`RelayMessage`] - NIP-01 JSON array messages
//! - [`VerifyError`], [`MessageError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod event;
mod filter;
mod message;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{MessageError, VerifyError};
pub use event::{Event, VerifiedEvent};
pub use filter::Filter;
pub use message::{ClientMessage, RelayMessage};
