//! Message signatures: RSASSA-PKCS1-v1_5 over SHA-256, base64 encoded.

use crate::error::{Error, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

/// Sign the UTF-8 bytes of `text`.
///
/// Deterministic for a given key: PKCS#1 v1.5 uses no randomness.
pub fn sign(text: &str, private_key: &RsaPrivateKey) -> Result<String> {
    let digest = Sha256::digest(text.as_bytes());
    let signature = private_key
        .sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| Error::Crypto(e.to_string()))?;
    Ok(BASE64.encode(signature))
}

/// Verify a base64 signature over the UTF-8 bytes of `text`.
///
/// Never fails loudly: malformed base64 or a bad signature yield `false`.
pub fn verify(text: &str, signature: &str, verifier_key: &RsaPublicKey) -> bool {
    let Ok(signature) = BASE64.decode(signature) else {
        return false;
    };
    let digest = Sha256::digest(text.as_bytes());
    verifier_key
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
        .is_ok()
}
