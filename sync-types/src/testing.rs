//! Fixture helpers for tests (enabled by the `testing` feature).
//!
//! Signs events with fixed secret keys so tests can exercise real
//! verification without touching the network.

use secp256k1::{Keypair, Message, Secp256k1};

use crate::Event;

/// Secret key used by fixtures unless a test needs a second author.
pub const TEST_SECRET: [u8; 32] = [1u8; 32];

/// Timestamp stamped on fixture events.
pub const TEST_CREATED_AT: i64 = 1_700_000_000;

/// Hex x-only public key for a fixture secret.
pub fn pubkey_hex(secret: [u8; 32]) -> String {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_seckey_slice(&secp, &secret).expect("fixture secret is valid");
    hex::encode(keypair.x_only_public_key().0.serialize())
}

/// Build and sign an event with the given secret key.
pub fn signed_event(secret: [u8; 32], kind: u32, tags: Vec<Vec<String>>, content: &str) -> Event {
    let secp = Secp256k1::new();
    let keypair = Keypair::from_seckey_slice(&secp, &secret).expect("fixture secret is valid");

    let mut event = Event {
        id: String::new(),
        pubkey: hex::encode(keypair.x_only_public_key().0.serialize()),
        created_at: TEST_CREATED_AT,
        kind,
        tags,
        content: content.to_string(),
        sig: String::new(),
    };
    let id = event.compute_id().expect("fixture serializes");
    event.id = hex::encode(id);

    let sig = secp.sign_schnorr_no_aux_rand(&Message::from_digest(id), &keypair);
    event.sig = hex::encode(sig.serialize());
    event
}

/// A signed kind-1 note with no tags.
pub fn signed_note(content: &str) -> Event {
    signed_event(TEST_SECRET, 1, Vec::new(), content)
}
