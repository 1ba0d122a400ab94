//! Public key input validation.
//!
//! Users paste identities as either `npub1...` or 64-character hex. Both are
//! normalized to the same pair of canonical forms so callers never re-derive.

use thiserror::Error;

use crate::bech32::{self, Bech32Error};

/// Canonical forms of one public key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PubkeyForms {
    /// Lowercase 64-character hex.
    pub hex: String,
    /// Bech32 `npub1...` encoding.
    pub npub: String,
}

impl PubkeyForms {
    /// Build both forms from raw key bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            hex: hex::encode(bytes),
            npub: bech32::encode_npub(bytes),
        }
    }
}

/// Pubkey validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PubkeyError {
    /// Nothing to validate.
    #[error("empty public key")]
    Empty,

    /// The input is a private key; it is never echoed back.
    #[error("input is a secret key (nsec); provide the public key instead")]
    SecretKeyInput,

    /// The input looked like an npub but did not decode.
    #[error("invalid npub: {0}")]
    InvalidNpub(#[from] Bech32Error),

    /// The input is neither npub nor 64-character hex.
    #[error("expected npub or 64-character hex public key")]
    UnrecognizedFormat,
}

/// True for exactly 64 hex characters (either case).
pub fn is_hex_pubkey(input: &str) -> bool {
    input.len() == 64 && input.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Validate `npub1...` or 64-hex input and return both canonical forms.
pub fn validate_pubkey(input: &str) -> Result<PubkeyForms, PubkeyError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(PubkeyError::Empty);
    }

    let lower = input.to_ascii_lowercase();
    if lower.starts_with("npub") {
        let bytes = bech32::decode_npub(input)?;
        return Ok(PubkeyForms::from_bytes(&bytes));
    }
    if lower.starts_with("nsec") {
        return Err(PubkeyError::SecretKeyInput);
    }
    if is_hex_pubkey(input) {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(&lower, &mut bytes).map_err(|_| PubkeyError::UnrecognizedFormat)?;
        return Ok(PubkeyForms::from_bytes(&bytes));
    }
    Err(PubkeyError::UnrecognizedFormat)
}
