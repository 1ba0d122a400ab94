//! NIP-05 identifier parsing and `nostr.json` lookup.
//!
//! Fetching the document is I/O and lives in `sync-client`; this module only
//! parses identifiers and interprets a document that has already been fetched.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

use crate::pubkey::{is_hex_pubkey, validate_pubkey, PubkeyForms};

/// Identifier parse errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Nip05ParseError {
    /// No `@` in the input.
    #[error("missing '@' in NIP-05 identifier")]
    MissingAt,

    /// More than one `@`.
    #[error("more than one '@' in NIP-05 identifier")]
    MultipleAt,

    /// The domain is too short or has no dot.
    #[error("invalid NIP-05 domain: {0}")]
    InvalidDomain(String),
}

/// Errors looking a name up in a fetched document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Nip05LookupError {
    /// The name is absent from `names`.
    #[error("name not found")]
    NotFound,

    /// The name is present but maps to something that is not a hex pubkey.
    #[error("invalid pubkey for name: {0}")]
    InvalidPubkey(String),
}

/// A parsed `name@domain` identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip05Identifier {
    /// Local part, lowercased; `_` when the input had none.
    pub name: String,
    /// Domain, lowercased.
    pub domain: String,
}

impl Nip05Identifier {
    /// Parse `name@domain`. An empty name means the root identifier `_`.
    ///
    /// The domain check is a sanity filter (contains a dot, at least three
    /// characters), not full hostname validation.
    pub fn parse(input: &str) -> Result<Self, Nip05ParseError> {
        let input = input.trim();
        let (name, domain) = input.split_once('@').ok_or(Nip05ParseError::MissingAt)?;
        if domain.contains('@') {
            return Err(Nip05ParseError::MultipleAt);
        }
        if domain.len() < 3 || !domain.contains('.') {
            return Err(Nip05ParseError::InvalidDomain(domain.to_string()));
        }
        let name = if name.is_empty() { "_" } else { name };
        Ok(Self {
            name: name.to_lowercase(),
            domain: domain.to_lowercase(),
        })
    }
}

impl fmt::Display for Nip05Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.domain)
    }
}

/// The `/.well-known/nostr.json` document.
///
/// Entries are kept loosely typed: one malformed sibling must not stop a
/// valid name from resolving, and a malformed value for the requested name
/// is reported by [`lookup`](Self::lookup) rather than by decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Nip05Document {
    /// Name → hex pubkey, as published.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub names: HashMap<String, Value>,
    /// Hex pubkey → relay URLs. Entries that are not string lists are dropped.
    #[serde(default, deserialize_with = "relay_hints")]
    pub relays: HashMap<String, Vec<String>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<HashMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Object(map) => map.into_iter().collect(),
        _ => HashMap::new(),
    })
}

fn relay_hints<'de, D>(deserializer: D) -> Result<HashMap<String, Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let hints = null_as_empty(deserializer)?
        .into_iter()
        .filter_map(|(pubkey, urls)| {
            let Value::Array(urls) = urls else {
                return None;
            };
            let urls = urls
                .into_iter()
                .filter_map(|url| match url {
                    Value::String(url) => Some(url),
                    _ => None,
                })
                .collect();
            Some((pubkey, urls))
        })
        .collect();
    Ok(hints)
}

/// The result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip05Record {
    /// Both forms of the resolved key.
    pub pubkey: PubkeyForms,
    /// Relay hints published for that key.
    pub relays: Vec<String>,
}

impl Nip05Document {
    /// Find `name` (case-insensitively) and return its key and relay hints.
    pub fn lookup(&self, name: &str) -> Result<Nip05Record, Nip05LookupError> {
        let value = self
            .names
            .get(name)
            .or_else(|| {
                self.names
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .ok_or(Nip05LookupError::NotFound)?;

        let value = match value {
            Value::String(value) if is_hex_pubkey(value) => value,
            Value::String(value) => return Err(Nip05LookupError::InvalidPubkey(value.clone())),
            other => return Err(Nip05LookupError::InvalidPubkey(other.to_string())),
        };
        let pubkey =
            validate_pubkey(value).map_err(|_| Nip05LookupError::InvalidPubkey(value.clone()))?;

        let relays = self
            .relays
            .get(&pubkey.hex)
            .or_else(|| self.relays.get(value.as_str()))
            .cloned()
            .unwrap_or_default();

        Ok(Nip05Record { pubkey, relays })
    }
}
