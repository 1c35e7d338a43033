//! Hybrid encryption of message envelopes.
//!
//! ```text
//! body key  (32 random bytes)
//!   ├── AES-256-CBC(plaintext)           → text
//!   ├── RSA-OAEP(sender public key)      → senderEncryptedKey
//!   └── RSA-OAEP(receiver public key)    → receiverEncryptedKey
//! sign(plaintext, sender private key)    → signature
//! ```
//!
//! OAEP uses SHA-1 with MGF1-SHA-1, the parameters the relay's other
//! clients use.

use super::signature::sign;
use super::symmetric::{self, KEY_SIZE};
use super::Perspective;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::protocol::{DecryptedMessage, Message};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use zeroize::Zeroizing;

/// Encrypt and sign `plaintext` from the local party to the remote party.
///
/// The returned envelope has no `id` (assigned by the server) and a zero
/// timestamp; the caller stamps it when posting.
pub fn encrypt(
    plaintext: &str,
    local_public_key: &RsaPublicKey,
    remote_public_key: &RsaPublicKey,
    local_private_key: &RsaPrivateKey,
) -> Result<Message> {
    let key = symmetric::generate_key();
    let body = symmetric::encrypt_with_random_iv(&key, plaintext.as_bytes());

    let sender_encrypted_key = wrap_key(&key, local_public_key)?;
    let receiver_encrypted_key = wrap_key(&key, remote_public_key)?;

    Ok(Message {
        id: None,
        sender: Identity::from_public_key(local_public_key),
        receiver: Some(Identity::from_public_key(remote_public_key)),
        body: BASE64.encode(body),
        sender_encrypted_key: Some(BASE64.encode(sender_encrypted_key)),
        receiver_encrypted_key: Some(BASE64.encode(receiver_encrypted_key)),
        signature: sign(plaintext, local_private_key)?,
        timestamp: 0,
    })
}

/// Decrypt an envelope without checking its signature.
///
/// The wrapped key is selected by `perspective`. Fails with
/// [`Error::Crypto`] on a missing or foreign wrapped key, bad padding or a
/// non-UTF-8 body; callers treat that as "message rejected".
pub fn decrypt(
    message: &Message,
    local_private_key: &RsaPrivateKey,
    perspective: Perspective,
) -> Result<DecryptedMessage> {
    let wrapped = match perspective {
        Perspective::Sender => message.sender_encrypted_key.as_deref(),
        Perspective::Receiver => message.receiver_encrypted_key.as_deref(),
    }
    .ok_or_else(|| Error::Crypto("envelope lacks the wrapped key for this reader".into()))?;

    let wrapped = BASE64
        .decode(wrapped)
        .map_err(|_| Error::Crypto("wrapped key is not base64".into()))?;
    let ciphertext = BASE64
        .decode(&message.body)
        .map_err(|_| Error::Crypto("body is not base64".into()))?;

    let key = unwrap_key(&wrapped, local_private_key)?;
    let body = symmetric::decrypt_with_prepended_iv(&key, &ciphertext)?;
    let body = String::from_utf8(body.to_vec())
        .map_err(|_| Error::Crypto("body is not valid UTF-8".into()))?;

    Ok(DecryptedMessage {
        id: message.id,
        body,
        sender: message.sender.fingerprint().to_string(),
        timestamp: message.timestamp,
    })
}

fn wrap_key(key: &[u8; KEY_SIZE], public_key: &RsaPublicKey) -> Result<Vec<u8>> {
    public_key
        .encrypt(&mut OsRng, Oaep::new::<Sha1>(), &key[..])
        .map_err(|e| Error::Crypto(e.to_string()))
}

fn unwrap_key(wrapped: &[u8], private_key: &RsaPrivateKey) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let raw = Zeroizing::new(
        private_key
            .decrypt(Oaep::new::<Sha1>(), wrapped)
            .map_err(|_| Error::Crypto("key unwrap failed".into()))?,
    );
    let key: [u8; KEY_SIZE] = raw[..]
        .try_into()
        .map_err(|_| Error::Crypto("unwrapped key has wrong size".into()))?;
    Ok(Zeroizing::new(key))
}
