//! Error types for relaysync wire handling.

use thiserror::Error;

/// Reasons an event fails verification.
///
/// Each variant is distinguishable so callers can report or skip precisely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// A hex field did not decode.
    #[error("malformed hex in {field}")]
    MalformedHex {
        /// Which event field was malformed.
        field: &'static str,
    },

    /// A field decoded (or is declared) with the wrong length.
    #[error("invalid {field} length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Which event field had the wrong length.
        field: &'static str,
        /// Expected length (hex characters or bytes, per field).
        expected: usize,
        /// Actual length.
        actual: usize,
    },

    /// The stated id does not match the hash of the canonical serialization.
    #[error("id mismatch: stated {stated}, computed {computed}")]
    IdMismatch {
        /// Id carried by the event.
        stated: String,
        /// Id computed from the event contents.
        computed: String,
    },

    /// The pubkey is not a valid x-only curve point.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// The signature bytes are not a valid Schnorr signature encoding.
    #[error("invalid signature encoding")]
    InvalidSignature,

    /// The signature does not verify against the id and pubkey.
    #[error("signature mismatch")]
    SignatureMismatch,

    /// Canonical serialization failed.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Errors parsing a relay-to-client message.
///
/// These are recovered locally: the message is skipped and the session continues.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The text was not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON was valid but not a labelled array.
    #[error("not a relay message array")]
    NotAnArray,

    /// The label is not one this client understands.
    #[error("unknown message label: {0}")]
    UnknownLabel(String),

    /// The array had the wrong number of elements for its label.
    #[error("wrong arity for {label}: got {actual} elements")]
    WrongArity {
        /// The message label.
        label: &'static str,
        /// Number of elements received.
        actual: usize,
    },

    /// An element had the wrong JSON type.
    #[error("invalid field in {label}: {reason}")]
    InvalidField {
        /// The message label.
        label: &'static str,
        /// What was wrong.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = VerifyError::InvalidLength {
            field: "sig",
            expected: 64,
            actual: 12,
        };
        assert_eq!(err.to_string(), "invalid sig length: expected 64, got 12");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VerifyError>();
        assert_send_sync::<MessageError>();
    }
}
