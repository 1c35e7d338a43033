//! Identity management for SecureChat.
//!
//! A participant is an RSA public key. The key's modulus, rendered as
//! lowercase hex, is its fingerprint and the only thing that identifies it:
//! two identities are equal iff their fingerprints match.
//!
//! ## Wire Form
//!
//! ```text
//! {"modulus": "<hex>", "exponent": "<hex>"}
//! ```
//!
//! Hex is accepted in either case (and with an odd number of digits), and is
//! always written lowercase without leading zeros.

mod keypair;

pub use keypair::KeyPair;

use crate::error::{Error, Result};
use crate::logging::ShortFingerprint;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// A participant's public RSA key, identified by its fingerprint.
///
/// Values received from the relay are not validated as usable RSA keys until
/// [`Identity::to_public_key`] is called.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "WireIdentity", into = "WireIdentity")]
pub struct Identity {
    modulus: BigUint,
    exponent: BigUint,
    fingerprint: String,
}

impl Identity {
    /// Build an identity from raw modulus and exponent.
    pub fn new(modulus: BigUint, exponent: BigUint) -> Self {
        let fingerprint = to_hex(&modulus);
        Self {
            modulus,
            exponent,
            fingerprint,
        }
    }

    /// Parse an identity from hex modulus and exponent.
    pub fn from_hex(modulus: &str, exponent: &str) -> Result<Self> {
        Ok(Self::new(parse_hex(modulus)?, parse_hex(exponent)?))
    }

    /// Identity of an RSA public key.
    pub fn from_public_key(key: &RsaPublicKey) -> Self {
        Self::new(key.n().clone(), key.e().clone())
    }

    /// Lowercase hex modulus; the identity's unique key.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Lowercase hex public exponent.
    pub fn exponent_hex(&self) -> String {
        to_hex(&self.exponent)
    }

    /// Convert into a usable RSA public key.
    pub fn to_public_key(&self) -> Result<RsaPublicKey> {
        RsaPublicKey::new(self.modulus.clone(), self.exponent.clone())
            .map_err(|e| Error::InvalidKey(e.to_string()))
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for Identity {}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", ShortFingerprint(&self.fingerprint))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint)
    }
}

/// JSON shape of an identity.
#[derive(Serialize, Deserialize)]
struct WireIdentity {
    modulus: String,
    exponent: String,
}

impl TryFrom<WireIdentity> for Identity {
    type Error = Error;

    fn try_from(wire: WireIdentity) -> Result<Self> {
        Self::from_hex(&wire.modulus, &wire.exponent)
    }
}

impl From<Identity> for WireIdentity {
    fn from(identity: Identity) -> Self {
        let exponent = identity.exponent_hex();
        Self {
            modulus: identity.fingerprint,
            exponent,
        }
    }
}

/// Parse a non-empty, case-insensitive hex string into an unsigned integer.
fn parse_hex(s: &str) -> Result<BigUint> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::Encoding("empty hex value".into()));
    }
    let bytes = if s.len() % 2 == 1 {
        hex::decode(format!("0{}", s))
    } else {
        hex::decode(s)
    }
    .map_err(|e| Error::Encoding(e.to_string()))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

/// Render an unsigned integer as lowercase hex without leading zeros.
fn to_hex(n: &BigUint) -> String {
    let encoded = hex::encode(n.to_bytes_be());
    match encoded.trim_start_matches('0') {
        "" => "0".to_string(),
        trimmed => trimmed.to_string(),
    }
}

/// Format a fingerprint for human-readable display.
///
/// Splits into groups of 8 characters for easier verbal comparison.
pub fn format_fingerprint(fingerprint: &str) -> String {
    fingerprint
        .as_bytes()
        .chunks(8)
        .map(|chunk| std::str::from_utf8(chunk).unwrap_or(""))
        .collect::<Vec<_>>()
        .join(" ")
}
