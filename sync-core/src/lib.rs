//! # sync-core
//!
//! Pure logic for relaysync (no I/O, instant tests).
//!
//! This crate implements the codecs, validators and the subscription state
//! machine without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (WebSocket, HTTPS) is performed by `sync-client`, which
//! interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bech32;
pub mod nip05;
pub mod pubkey;
pub mod subid;
pub mod subscription;

pub use bech32::{decode_npub, encode_npub, Bech32Error};
pub use nip05::{Nip05Document, Nip05Identifier, Nip05LookupError, Nip05ParseError, Nip05Record};
pub use pubkey::{is_hex_pubkey, validate_pubkey, PubkeyError, PubkeyForms};
pub use subid::SubscriptionIds;
pub use subscription::{Action, Input, SubscriptionEnd, SubscriptionState};
