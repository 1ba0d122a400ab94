//! NIP-05 resolution and identity input handling.
//!
//! [`Nip05Resolver`] fetches `/.well-known/nostr.json` over HTTPS.
//! [`resolve_identity`] turns whatever a user typed (npub, hex, or
//! `name@domain`) into a canonical key plus any relay hints.

use std::fmt;

use relaysync_core::{
    is_hex_pubkey, validate_pubkey, Nip05Document, Nip05Identifier, Nip05LookupError,
    Nip05ParseError, PubkeyError, PubkeyForms,
};
use reqwest::{redirect, StatusCode};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::ClientConfig;

/// NIP-05 errors.
#[derive(Debug, Error)]
pub enum Nip05Error {
    /// Identifier is not `name@domain`.
    #[error("invalid NIP-05 identifier: {0}")]
    Parse(#[from] Nip05ParseError),

    /// HTTP request failed, returned non-200, or the body was not a NIP-05 document.
    #[error("NIP-05 fetch failed: {0}")]
    Fetch(String),

    /// The document has no entry for the name.
    #[error("{identifier} not found")]
    NotFound {
        /// Identifier that was looked up.
        identifier: String,
    },

    /// The entry for the name is not a 64-hex pubkey.
    #[error("{identifier} maps to an invalid pubkey: {value}")]
    InvalidPubkey {
        /// Identifier that was looked up.
        identifier: String,
        /// Value found in `names`.
        value: String,
    },
}

/// A key resolved from a NIP-05 identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nip05Resolution {
    /// Normalized `name@domain`.
    pub identifier: String,
    /// Both forms of the key.
    pub pubkey: PubkeyForms,
    /// Relay hints (may be empty).
    pub relays: Vec<String>,
}

/// Fetches and interprets NIP-05 documents.
#[derive(Debug, Clone)]
pub struct Nip05Resolver {
    http: reqwest::Client,
    scheme: &'static str,
}

impl Nip05Resolver {
    /// Build a resolver using `config.nip05_timeout`. Redirects are refused.
    pub fn new(config: &ClientConfig) -> Result<Self, Nip05Error> {
        let http = reqwest::Client::builder()
            .timeout(config.nip05_timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| Nip05Error::Fetch(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            scheme: "https",
        })
    }

    /// Plain-HTTP resolver for loopback test servers.
    #[cfg(test)]
    fn plaintext(config: &ClientConfig) -> Self {
        let mut resolver = Self::new(config).unwrap();
        resolver.scheme = "http";
        resolver
    }

    /// `https://{domain}/.well-known/nostr.json?name={name}`.
    pub fn well_known_url(&self, id: &Nip05Identifier) -> Result<Url, Nip05Error> {
        let mut url = Url::parse(&format!(
            "{}://{}/.well-known/nostr.json",
            self.scheme, id.domain
        ))
        .map_err(|e| Nip05Error::Parse(Nip05ParseError::InvalidDomain(format!("{}: {e}", id.domain))))?;
        url.query_pairs_mut().append_pair("name", &id.name);
        Ok(url)
    }

    /// Fetch the document for `id`.
    pub async fn fetch(&self, id: &Nip05Identifier) -> Result<Nip05Document, Nip05Error> {
        let url = self.well_known_url(id)?;
        debug!(%url, "fetching NIP-05 document");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Nip05Error::Fetch(format!("{url}: {e}")))?;
        if response.status() != StatusCode::OK {
            return Err(Nip05Error::Fetch(format!(
                "{url}: HTTP {}",
                response.status()
            )));
        }
        response
            .json::<Nip05Document>()
            .await
            .map_err(|e| Nip05Error::Fetch(format!("{url}: {e}")))
    }

    /// Parse `input`, fetch its document and look the name up.
    pub async fn resolve(&self, input: &str) -> Result<Nip05Resolution, Nip05Error> {
        let id = Nip05Identifier::parse(input)?;
        let document = self.fetch(&id).await?;
        let identifier = id.to_string();
        match document.lookup(&id.name) {
            Ok(record) => Ok(Nip05Resolution {
                identifier,
                pubkey: record.pubkey,
                relays: record.relays,
            }),
            Err(Nip05LookupError::NotFound) => Err(Nip05Error::NotFound { identifier }),
            Err(Nip05LookupError::InvalidPubkey(value)) => {
                Err(Nip05Error::InvalidPubkey { identifier, value })
            }
        }
    }
}

/// Which input shape produced a [`ResolvedIdentity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentitySource {
    /// `npub1...`
    Npub,
    /// 64-character hex.
    Hex,
    /// `name@domain`.
    Nip05,
}

impl fmt::Display for IdentitySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Npub => "npub",
            Self::Hex => "hex",
            Self::Nip05 => "nip05",
        })
    }
}

/// A user-supplied identity in canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// Lowercase hex pubkey.
    pub hex: String,
    /// Bech32 npub.
    pub npub: String,
    /// Input shape.
    pub source: IdentitySource,
    /// Normalized identifier when resolved via NIP-05.
    pub nip05: Option<String>,
    /// Relay hints from NIP-05 (empty otherwise).
    pub relays: Vec<String>,
}

impl ResolvedIdentity {
    fn from_forms(forms: PubkeyForms, source: IdentitySource) -> Self {
        Self {
            hex: forms.hex,
            npub: forms.npub,
            source,
            nip05: None,
            relays: Vec::new(),
        }
    }
}

/// Identity resolution errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// npub or hex input was invalid, or the input was an nsec.
    #[error(transparent)]
    Pubkey(#[from] PubkeyError),

    /// NIP-05 resolution failed.
    #[error(transparent)]
    Nip05(#[from] Nip05Error),
}

/// Resolve npub, hex or NIP-05 input.
///
/// Shapes are tried in a fixed order (npub, then hex, then `@`) and the first
/// match wins with no fallback: a malformed npub is an npub error even if it
/// contains `@`.
pub async fn resolve_identity(
    input: &str,
    resolver: &Nip05Resolver,
) -> Result<ResolvedIdentity, IdentityError> {
    let input = input.trim();

    if input.to_ascii_lowercase().starts_with("npub") {
        let forms = validate_pubkey(input)?;
        return Ok(ResolvedIdentity::from_forms(forms, IdentitySource::Npub));
    }
    if is_hex_pubkey(input) {
        let forms = validate_pubkey(input)?;
        return Ok(ResolvedIdentity::from_forms(forms, IdentitySource::Hex));
    }
    if input.contains('@') {
        let resolution = resolver.resolve(input).await?;
        return Ok(ResolvedIdentity {
            hex: resolution.pubkey.hex,
            npub: resolution.pubkey.npub,
            source: IdentitySource::Nip05,
            nip05: Some(resolution.identifier),
            relays: resolution.relays,
        });
    }

    // Empty, nsec, or garbage: report it the way pubkey validation does.
    match validate_pubkey(input) {
        Err(e) => Err(e.into()),
        Ok(_) => Err(PubkeyError::UnrecognizedFormat.into()),
    }
}
