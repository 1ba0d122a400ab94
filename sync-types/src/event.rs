//! Nostr event model and verification (NIP-01).
//!
//! An [`Event`] as received from a relay is untrusted: its `id` and `sig` are
//! meaningless until [`Event::verify`] succeeds. Verification consumes the
//! event and yields a [`VerifiedEvent`], which is the only form accepted by
//! downstream sinks.

use std::ops::Deref;
use std::sync::OnceLock;

use secp256k1::{schnorr::Signature, Message, Secp256k1, VerifyOnly, XOnlyPublicKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::VerifyError;

/// Hex length of an event id (32-byte SHA-256).
const ID_HEX_LEN: usize = 64;

fn verifier() -> &'static Secp256k1<VerifyOnly> {
    static CTX: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();
    CTX.get_or_init(Secp256k1::verification_only)
}

/// A Nostr event in wire format.
///
/// ```json
/// {
///   "id": "4376c65d...",
///   "pubkey": "6e468422...",
///   "created_at": 1673347337,
///   "kind": 1,
///   "tags": [["e", "3da979..."], ["p", "bf2376..."]],
///   "content": "hello",
///   "sig": "908a15e4..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Lowercase hex SHA-256 of the canonical serialization.
    pub id: String,
    /// Author x-only public key (hex).
    pub pubkey: String,
    /// Unix timestamp in seconds.
    pub created_at: i64,
    /// Event kind.
    pub kind: u32,
    /// Ordered tags; order is significant and preserved exactly.
    pub tags: Vec<Vec<String>>,
    /// Arbitrary content.
    pub content: String,
    /// BIP-340 Schnorr signature over the id (hex).
    pub sig: String,
}

impl Event {
    /// Canonical serialization: `[0, pubkey, created_at, kind, tags, content]`.
    ///
    /// Numbers stay numbers. The output must match what the signer hashed
    /// byte for byte.
    pub fn canonical_json(&self) -> Result<String, VerifyError> {
        serde_json::to_string(&(
            0,
            &self.pubkey,
            self.created_at,
            self.kind,
            &self.tags,
            &self.content,
        ))
        .map_err(|e| VerifyError::Serialization(e.to_string()))
    }

    /// SHA-256 of the canonical serialization.
    pub fn compute_id(&self) -> Result<[u8; 32], VerifyError> {
        let serialized = self.canonical_json()?;
        Ok(Sha256::digest(serialized.as_bytes()).into())
    }

    /// Check that the stated id matches the event contents.
    pub fn verify_id(&self) -> Result<(), VerifyError> {
        if self.id.len() != ID_HEX_LEN {
            return Err(VerifyError::InvalidLength {
                field: "id",
                expected: ID_HEX_LEN,
                actual: self.id.len(),
            });
        }
        if !self.id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(VerifyError::MalformedHex { field: "id" });
        }

        let computed = hex::encode(self.compute_id()?);
        if computed != self.id {
            return Err(VerifyError::IdMismatch {
                stated: self.id.clone(),
                computed,
            });
        }
        Ok(())
    }

    /// Check the Schnorr signature over the decoded id.
    ///
    /// The signed message is the 32-byte id, not the JSON text.
    pub fn verify_signature(&self) -> Result<(), VerifyError> {
        let pubkey = decode_fixed::<32>("pubkey", &self.pubkey)?;
        let sig = decode_fixed::<64>("sig", &self.sig)?;
        let id = decode_fixed::<32>("id", &self.id)?;

        let pubkey =
            XOnlyPublicKey::from_slice(&pubkey).map_err(|_| VerifyError::InvalidPublicKey)?;
        let sig = Signature::from_slice(&sig).map_err(|_| VerifyError::InvalidSignature)?;
        let message = Message::from_digest(id);

        verifier()
            .verify_schnorr(&sig, &message, &pubkey)
            .map_err(|_| VerifyError::SignatureMismatch)
    }

    /// Verify id then signature, short-circuiting on the first failure.
    pub fn verify(self) -> Result<VerifiedEvent, VerifyError> {
        self.verify_id()?;
        self.verify_signature()?;
        Ok(VerifiedEvent(self))
    }
}

/// Decode a hex field into exactly `N` bytes.
fn decode_fixed<const N: usize>(field: &'static str, value: &str) -> Result<[u8; N], VerifyError> {
    let bytes = hex::decode(value).map_err(|_| VerifyError::MalformedHex { field })?;
    let actual = bytes.len();
    bytes.try_into().map_err(|_| VerifyError::InvalidLength {
        field,
        expected: N,
        actual,
    })
}

/// An event whose id and signature have been checked.
///
/// Only [`Event::verify`] constructs this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VerifiedEvent(Event);

impl VerifiedEvent {
    /// Unwrap into the underlying event.
    pub fn into_inner(self) -> Event {
        self.0
    }
}

impl Deref for VerifiedEvent {
    type Target = Event;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{signed_event, TEST_SECRET};

    fn sample() -> Event {
        signed_event(
            TEST_SECRET,
            1,
            vec![
                vec!["e".into(), "abc".into()],
                vec!["p".into(), "def".into(), "wss://relay".into()],
            ],
            "hello \"nostr\"\n",
        )
    }

    // ===========================================
    // Serialization Tests
    // ===========================================

    #[test]
    fn canonical_json_layout() {
        let ev = Event {
            id: String::new(),
            pubkey: "ab".into(),
            created_at: 1_700_000_000,
            kind: 7,
            tags: vec![vec!["t".into(), "x".into()]],
            content: "hi".into(),
            sig: String::new(),
        };
        assert_eq!(
            ev.canonical_json().unwrap(),
            r#"[0,"ab",1700000000,7,[["t","x"]],"hi"]"#
        );
    }

    #[test]
    fn canonical_json_is_deterministic() {
        let ev = sample();
        let first = ev.canonical_json().unwrap();
        for _ in 0..10 {
            assert_eq!(ev.canonical_json().unwrap(), first);
        }
    }

    #[test]
    fn canonical_json_preserves_tag_order() {
        let mut ev = sample();
        let original = ev.canonical_json().unwrap();
        ev.tags.reverse();
        assert_ne!(ev.canonical_json().unwrap(), original);
    }

    // ===========================================
    // Verification Tests
    // ===========================================

    #[test]
    fn signed_event_verifies() {
        let ev = sample();
        let verified = ev.clone().verify().unwrap();
        assert_eq!(*verified, ev);
    }

    #[test]
    fn tampered_content_is_rejected() {
        let mut ev = sample();
        ev.content.push('!');
        assert!(matches!(ev.verify(), Err(VerifyError::IdMismatch { .. })));
    }

    #[test]
    fn recomputed_id_with_stale_signature_is_rejected() {
        let mut ev = sample();
        ev.content = "forged".into();
        ev.id = hex::encode(ev.compute_id().unwrap());
        assert_eq!(ev.verify(), Err(VerifyError::SignatureMismatch));
    }

    #[test]
    fn uppercase_id_is_rejected() {
        let mut ev = sample();
        ev.id = ev.id.to_uppercase();
        assert!(matches!(ev.verify_id(), Err(VerifyError::IdMismatch { .. })));
    }

    #[test]
    fn short_id_is_rejected_before_hashing() {
        let mut ev = sample();
        ev.id.truncate(10);
        assert_eq!(
            ev.verify_id(),
            Err(VerifyError::InvalidLength {
                field: "id",
                expected: 64,
                actual: 10
            })
        );
    }

    #[test]
    fn non_hex_id_is_rejected() {
        let mut ev = sample();
        ev.id.replace_range(0..1, "z");
        assert_eq!(ev.verify_id(), Err(VerifyError::MalformedHex { field: "id" }));
    }

    #[test]
    fn short_signature_is_rejected() {
        let mut ev = sample();
        ev.sig.truncate(64);
        assert_eq!(
            ev.verify_signature(),
            Err(VerifyError::InvalidLength {
                field: "sig",
                expected: 64,
                actual: 32
            })
        );
    }

    #[test]
    fn malformed_pubkey_hex_is_rejected() {
        let mut ev = sample();
        ev.pubkey = "not-hex".into();
        assert_eq!(
            ev.verify_signature(),
            Err(VerifyError::MalformedHex { field: "pubkey" })
        );
    }

    #[test]
    fn signature_from_other_key_is_rejected() {
        let ev = sample();
        let other = signed_event([7u8; 32], ev.kind, ev.tags.clone(), &ev.content);
        let mut forged = ev.clone();
        forged.sig = other.sig;
        assert_eq!(forged.verify(), Err(VerifyError::SignatureMismatch));
    }

    #[test]
    fn verified_event_serializes_as_plain_event() {
        let ev = sample();
        let verified = ev.clone().verify().unwrap();
        assert_eq!(
            serde_json::to_value(&verified).unwrap(),
            serde_json::to_value(&ev).unwrap()
        );
    }

    #[test]
    fn event_round_trips_through_json() {
        let ev = sample();
        let json = serde_json::to_string(&ev).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ev);
        assert!(back.verify().is_ok());
    }
}
