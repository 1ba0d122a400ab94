//! Bech32 checksum encoding (BIP-173) and the `npub` identity format (NIP-19).
//!
//! A bech32 string is `hrp + '1' + data + checksum`, where data and the
//! 6-symbol checksum use a 32-character alphabet. The checksum is a 30-bit
//! BCH code over the expanded HRP followed by the data symbols. Nostr strings
//! routinely exceed the 90-character limit of BIP-173, so it is not enforced.

use thiserror::Error;

/// Human-readable part for public keys.
pub const NPUB_HRP: &str = "npub";

const CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const GENERATOR: [u32; 5] = [0x3b6a57b2, 0x26508e6d, 0x1ea119fa, 0x3d4233dd, 0x2a1462b3];
const CHECKSUM_LEN: usize = 6;
const SEPARATOR: char = '1';

/// Bech32 decoding and encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Bech32Error {
    /// Upper and lower case mixed in one string.
    #[error("mixed-case bech32 string")]
    MixedCase,

    /// No `1` separator.
    #[error("missing separator")]
    MissingSeparator,

    /// Nothing before the separator.
    #[error("empty human-readable part")]
    EmptyHrp,

    /// Fewer than six characters after the separator.
    #[error("checksum too short")]
    ChecksumTooShort,

    /// HRP character outside the printable ASCII range.
    #[error("invalid human-readable part character: {0:?}")]
    InvalidHrpChar(char),

    /// Data character outside the bech32 alphabet.
    #[error("invalid data character: {0:?}")]
    InvalidChar(char),

    /// Checksum does not verify.
    #[error("invalid checksum")]
    InvalidChecksum,

    /// Leftover bits when regrouping 5-bit symbols into bytes.
    #[error("invalid padding")]
    InvalidPadding,

    /// Valid bech32 but for a different prefix.
    #[error("unexpected prefix: expected {expected}, found {found}")]
    UnexpectedHrp {
        /// The required prefix.
        expected: &'static str,
        /// The prefix that was decoded.
        found: String,
    },

    /// Valid bech32 but the payload has the wrong size.
    #[error("invalid payload length: expected {expected} bytes, found {found}")]
    InvalidDataLength {
        /// Required payload size.
        expected: usize,
        /// Decoded payload size.
        found: usize,
    },
}

fn polymod(values: impl IntoIterator<Item = u8>) -> u32 {
    let mut chk: u32 = 1;
    for value in values {
        let top = chk >> 25;
        chk = ((chk & 0x01ff_ffff) << 5) ^ u32::from(value);
        for (i, generator) in GENERATOR.iter().enumerate() {
            if (top >> i) & 1 == 1 {
                chk ^= generator;
            }
        }
    }
    chk
}

fn hrp_expand(hrp: &str) -> Vec<u8> {
    let bytes = hrp.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() * 2 + 1);
    out.extend(bytes.iter().map(|b| b >> 5));
    out.push(0);
    out.extend(bytes.iter().map(|b| b & 0x1f));
    out
}

fn verify_checksum(hrp: &str, data: &[u8]) -> bool {
    polymod(hrp_expand(hrp).into_iter().chain(data.iter().copied())) == 1
}

fn create_checksum(hrp: &str, data: &[u8]) -> [u8; CHECKSUM_LEN] {
    let values = hrp_expand(hrp)
        .into_iter()
        .chain(data.iter().copied())
        .chain([0u8; CHECKSUM_LEN]);
    let pm = polymod(values) ^ 1;
    let mut checksum = [0u8; CHECKSUM_LEN];
    for (i, symbol) in checksum.iter_mut().enumerate() {
        *symbol = ((pm >> (5 * (5 - i))) & 0x1f) as u8;
    }
    checksum
}

/// Regroup `from`-bit values into `to`-bit values.
///
/// With `pad` unset (decoding), at most `from - 1` leftover bits are allowed
/// and they must all be zero.
fn convert_bits(data: &[u8], from: u32, to: u32, pad: bool) -> Result<Vec<u8>, Bech32Error> {
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let max_value: u32 = (1 << to) - 1;
    let max_acc: u32 = (1 << (from + to - 1)) - 1;
    let mut out = Vec::with_capacity(data.len() * from as usize / to as usize + 1);

    for &value in data {
        let value = u32::from(value);
        if value >> from != 0 {
            return Err(Bech32Error::InvalidPadding);
        }
        acc = ((acc << from) | value) & max_acc;
        bits += from;
        while bits >= to {
            bits -= to;
            out.push(((acc >> bits) & max_value) as u8);
        }
    }

    if pad {
        if bits > 0 {
            out.push(((acc << (to - bits)) & max_value) as u8);
        }
    } else if bits >= from || ((acc << (to - bits)) & max_value) != 0 {
        return Err(Bech32Error::InvalidPadding);
    }
    Ok(out)
}

fn check_hrp(hrp: &str) -> Result<(), Bech32Error> {
    if hrp.is_empty() {
        return Err(Bech32Error::EmptyHrp);
    }
    match hrp.chars().find(|c| !(33..=126).contains(&(*c as u32))) {
        Some(c) => Err(Bech32Error::InvalidHrpChar(c)),
        None => Ok(()),
    }
}

/// Split and checksum-verify, returning the lowercase HRP and 5-bit data
/// symbols with the checksum stripped.
fn decode_symbols(s: &str) -> Result<(String, Vec<u8>), Bech32Error> {
    let has_lower = s.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = s.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Err(Bech32Error::MixedCase);
    }
    let s = s.to_ascii_lowercase();

    let pos = s.rfind(SEPARATOR).ok_or(Bech32Error::MissingSeparator)?;
    let (hrp, rest) = (&s[..pos], &s[pos + 1..]);
    check_hrp(hrp)?;
    if rest.len() < CHECKSUM_LEN {
        return Err(Bech32Error::ChecksumTooShort);
    }

    let mut symbols = Vec::with_capacity(rest.len());
    for c in rest.chars() {
        let index = CHARSET
            .iter()
            .position(|&b| char::from(b) == c)
            .ok_or(Bech32Error::InvalidChar(c))?;
        symbols.push(index as u8);
    }

    if !verify_checksum(hrp, &symbols) {
        return Err(Bech32Error::InvalidChecksum);
    }
    symbols.truncate(symbols.len() - CHECKSUM_LEN);
    Ok((hrp.to_string(), symbols))
}

fn encode_symbols(hrp: &str, symbols: &[u8]) -> String {
    let checksum = create_checksum(hrp, symbols);
    let mut out = String::with_capacity(hrp.len() + 1 + symbols.len() + CHECKSUM_LEN);
    out.push_str(hrp);
    out.push(SEPARATOR);
    for &symbol in symbols.iter().chain(checksum.iter()) {
        out.push(char::from(CHARSET[usize::from(symbol)]));
    }
    out
}

/// Decode a bech32 string into its (lowercase) HRP and byte payload.
///
/// The checksum is verified before any of the payload is trusted.
pub fn decode(s: &str) -> Result<(String, Vec<u8>), Bech32Error> {
    let (hrp, symbols) = decode_symbols(s)?;
    let bytes = convert_bits(&symbols, 5, 8, false)?;
    Ok((hrp, bytes))
}

/// Encode a byte payload under the given HRP.
pub fn encode(hrp: &str, data: &[u8]) -> Result<String, Bech32Error> {
    check_hrp(hrp)?;
    let hrp = hrp.to_ascii_lowercase();
    let symbols = convert_bits(data, 8, 5, true)?;
    Ok(encode_symbols(&hrp, &symbols))
}

/// Encode a 32-byte x-only public key as `npub1...`.
pub fn encode_npub(pubkey: &[u8; 32]) -> String {
    // Regrouping with padding cannot fail for 8-bit input.
    let symbols = convert_bits(pubkey, 8, 5, true).unwrap_or_default();
    encode_symbols(NPUB_HRP, &symbols)
}

/// Decode an `npub1...` string into a 32-byte public key.
pub fn decode_npub(s: &str) -> Result<[u8; 32], Bech32Error> {
    let (hrp, data) = decode(s)?;
    if hrp != NPUB_HRP {
        return Err(Bech32Error::UnexpectedHrp {
            expected: NPUB_HRP,
            found: hrp,
        });
    }
    let found = data.len();
    data.try_into()
        .map_err(|_| Bech32Error::InvalidDataLength {
            expected: 32,
            found,
        })
}
