//! Cryptographic engine for SecureChat.
//!
//! Stateless: every operation takes its keys explicitly.
//!
//! - **RSASSA-PKCS1-v1_5 / SHA-256**: signatures over message plaintext
//! - **RSA-OAEP (SHA-1)**: wrapping the per-message body key
//! - **AES-256-CBC / PKCS#7**: message bodies, random IV per message
//!
//! ## Acceptance Rule
//!
//! Relay input is attacker-controlled. A message is accepted only if it
//! decrypts *and* its signature verifies over the recovered plaintext; see
//! [`open`]. Either failure discards the message.
//!
//! ## Limitations
//!
//! - No forward secrecy: a leaked private key decrypts all past traffic.
//! - No key rotation or revocation.

mod hybrid;
mod signature;
mod symmetric;

pub use hybrid::{decrypt, encrypt};
pub use signature::{sign, verify};
pub use symmetric::{
    decrypt_with_prepended_iv, encrypt_with_random_iv, generate_key, BLOCK_SIZE, IV_SIZE, KEY_SIZE,
};

use crate::error::{Error, Result};
use crate::identity::{Identity, KeyPair};
use crate::protocol::{DecryptedMessage, Message};
use std::sync::Arc;

/// Which copy of an envelope the local party is reading.
///
/// | Perspective | wrapped key unwrapped | signature checked against |
/// |---|---|---|
/// | `Sender`   | `senderEncryptedKey`   | local public key |
/// | `Receiver` | `receiverEncryptedKey` | the chat remote's public key |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Perspective {
    /// The local party wrote the message and is re-reading its own history.
    Sender,
    /// The local party is the addressee.
    Receiver,
}

impl Perspective {
    /// Perspective of `local` on `message`.
    pub fn of(message: &Message, local: &Identity) -> Self {
        if message.sender == *local {
            Perspective::Sender
        } else {
            Perspective::Receiver
        }
    }
}

/// Decrypt and verify an envelope belonging to the chat with `remote`.
///
/// The envelope's participants must be the local identity and `remote`,
/// in the order `perspective` implies. The signature of an incoming message
/// is checked against `remote`'s key, never against the key named in the
/// envelope; the sender field is relay-controlled.
///
/// Fails with [`Error::Crypto`] if the envelope belongs to another chat,
/// decryption fails or the signature does not verify, and with
/// [`Error::InvalidKey`] if `remote` is not a usable key.
pub fn open(
    message: &Message,
    keypair: &KeyPair,
    perspective: Perspective,
    remote: &Identity,
) -> Result<DecryptedMessage> {
    let local = keypair.identity();
    let participants_match = match perspective {
        // Our own copy must name the chat's remote as its receiver.
        Perspective::Sender => {
            message.sender == *local && message.receiver.as_ref() == Some(remote)
        }
        // Push events may omit the receiver.
        Perspective::Receiver => {
            message.sender == *remote && message.receiver.as_ref().map_or(true, |r| r == local)
        }
    };
    if !participants_match {
        return Err(Error::Crypto("envelope does not belong to this chat".into()));
    }

    let verifier_key = match perspective {
        Perspective::Sender => keypair.public_key(),
        Perspective::Receiver => remote.to_public_key()?,
    };

    let decrypted = decrypt(message, keypair.private_key(), perspective)?;
    if !verify(&decrypted.body, &message.signature, &verifier_key) {
        return Err(Error::Crypto("signature verification failed".into()));
    }
    Ok(decrypted)
}

/// Caller-supplied decrypt+verify step used by the event dispatcher.
pub trait MessageOpener: Send + Sync {
    /// Open an envelope shown in the chat with `remote`, or fail if it must
    /// be rejected.
    fn open(&self, message: &Message, remote: &Identity) -> Result<DecryptedMessage>;
}

/// Opens envelopes with the local key pair, choosing the perspective from
/// the envelope's sender.
#[derive(Debug, Clone)]
pub struct LocalOpener {
    keypair: Arc<KeyPair>,
}

impl LocalOpener {
    /// Create an opener for the local key pair.
    pub fn new(keypair: Arc<KeyPair>) -> Self {
        Self { keypair }
    }
}

impl MessageOpener for LocalOpener {
    fn open(&self, message: &Message, remote: &Identity) -> Result<DecryptedMessage> {
        let perspective = Perspective::of(message, self.keypair.identity());
        open(message, &self.keypair, perspective, remote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use std::sync::OnceLock;

    fn alice() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();
        KEY.get_or_init(|| KeyPair::generate(1024).expect("generate alice"))
    }

    fn bob() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();
        KEY.get_or_init(|| KeyPair::generate(1024).expect("generate bob"))
    }

    fn eve() -> &'static KeyPair {
        static KEY: OnceLock<KeyPair> = OnceLock::new();
        KEY.get_or_init(|| KeyPair::generate(1024).expect("generate eve"))
    }

    fn seal(text: &str) -> Message {
        encrypt(
            text,
            &alice().public_key(),
            &bob().public_key(),
            alice().private_key(),
        )
        .expect("encrypt")
    }

    #[test]
    fn test_sign_is_deterministic() {
        let a = sign("hello", alice().private_key()).expect("sign");
        let b = sign("hello", alice().private_key()).expect("sign");
        assert_eq!(a, b);
        assert!(verify("hello", &a, &alice().public_key()));
    }

    #[test]
    fn test_verify_rejects_wrong_text_and_key() {
        let signature = sign("hello", alice().private_key()).expect("sign");
        assert!(!verify("hellO", &signature, &alice().public_key()));
        assert!(!verify("hello", &signature, &bob().public_key()));
    }

    #[test]
    fn test_verify_rejects_flipped_signature_bytes() {
        let signature = sign("hello", alice().private_key()).expect("sign");
        let raw = BASE64.decode(&signature).expect("base64");
        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x01;
            assert!(
                !verify("hello", &BASE64.encode(&tampered), &alice().public_key()),
                "flip at byte {} accepted",
                i
            );
        }
    }

    #[test]
    fn test_verify_rejects_resigned_message() {
        let forged = sign("hello", eve().private_key()).expect("sign");
        assert!(!verify("hello", &forged, &alice().public_key()));
    }

    #[test]
    fn test_verify_never_panics_on_garbage() {
        assert!(!verify("hello", "", &alice().public_key()));
        assert!(!verify("hello", "!!! not base64 !!!", &alice().public_key()));
        assert!(!verify("hello", "AAAA", &alice().public_key()));
    }

    #[test]
    fn test_encrypt_fills_envelope() {
        let message = seal("hello");
        assert_eq!(message.id, None);
        assert_eq!(&message.sender, alice().identity());
        assert_eq!(message.receiver.as_ref(), Some(bob().identity()));
        assert!(message.sender_encrypted_key.is_some());
        assert!(message.receiver_encrypted_key.is_some());
        assert_ne!(message.sender_encrypted_key, message.receiver_encrypted_key);
        assert!(!message.body.contains("hello"));
    }

    #[test]
    fn test_both_parties_can_read() {
        let message = seal("hello");

        let as_receiver =
            decrypt(&message, bob().private_key(), Perspective::Receiver).expect("bob decrypts");
        assert_eq!(as_receiver.body, "hello");
        assert_eq!(as_receiver.sender, alice().identity().fingerprint());

        let as_sender =
            decrypt(&message, alice().private_key(), Perspective::Sender).expect("alice decrypts");
        assert_eq!(as_sender.body, "hello");
    }

    #[test]
    fn test_wrong_perspective_fails() {
        let message = seal("hello");
        assert!(decrypt(&message, bob().private_key(), Perspective::Sender).is_err());
        assert!(decrypt(&message, alice().private_key(), Perspective::Receiver).is_err());
    }

    #[test]
    fn test_third_party_cannot_read() {
        let message = seal("hello");
        for perspective in [Perspective::Sender, Perspective::Receiver] {
            let err = decrypt(&message, eve().private_key(), perspective).expect_err("eve");
            assert!(matches!(err, Error::Crypto(_)));
        }
    }

    #[test]
    fn test_missing_wrapped_key_is_crypto_error() {
        let mut message = seal("hello");
        message.receiver_encrypted_key = None;
        let err = decrypt(&message, bob().private_key(), Perspective::Receiver).expect_err("none");
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_open_checks_signature() {
        let mut message = seal("hello");
        let alice_id = alice().identity();
        assert_eq!(
            open(&message, bob(), Perspective::Receiver, alice_id).expect("open").body,
            "hello"
        );

        message.signature = sign("hello", eve().private_key()).expect("sign");
        let err = open(&message, bob(), Perspective::Receiver, alice_id).expect_err("forged");
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_open_rejects_any_body_bit_flip() {
        let message = seal("hello");
        let raw = BASE64.decode(&message.body).expect("base64");
        for i in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[i] ^= 0x80;
            let mut forged = message.clone();
            forged.body = BASE64.encode(&tampered);
            assert!(
                open(&forged, bob(), Perspective::Receiver, alice().identity()).is_err(),
                "flip at byte {} accepted",
                i
            );
        }
    }

    #[test]
    fn test_perspective_of() {
        let message = seal("hello");
        assert_eq!(Perspective::of(&message, alice().identity()), Perspective::Sender);
        assert_eq!(Perspective::of(&message, bob().identity()), Perspective::Receiver);
    }

    #[test]
    fn test_local_opener_picks_perspective() {
        let message = seal("round trip");
        let alice_opener = LocalOpener::new(Arc::new(KeyPair::from_private_key(
            alice().private_key().clone(),
        )));
        let bob_opener = LocalOpener::new(Arc::new(KeyPair::from_private_key(
            bob().private_key().clone(),
        )));
        assert_eq!(
            alice_opener.open(&message, bob().identity()).expect("alice").body,
            "round trip"
        );
        assert_eq!(
            bob_opener.open(&message, alice().identity()).expect("bob").body,
            "round trip"
        );
    }

    #[test]
    fn test_open_rejects_sender_outside_the_chat() {
        // Eve signs with her own key and wraps the body key for Bob; the
        // envelope is valid on its own terms but Bob is reading his chat
        // with Alice.
        let message = encrypt(
            "wire 1000 to eve",
            &eve().public_key(),
            &bob().public_key(),
            eve().private_key(),
        )
        .expect("encrypt");
        assert!(open(&message, bob(), Perspective::Receiver, eve().identity()).is_ok());

        let err = open(&message, bob(), Perspective::Receiver, alice().identity())
            .expect_err("third-party sender");
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_open_ignores_key_claimed_by_envelope() {
        // Sender field rewritten to Alice, signature still Eve's.
        let mut message = encrypt(
            "trust me",
            &eve().public_key(),
            &bob().public_key(),
            eve().private_key(),
        )
        .expect("encrypt");
        message.sender = alice().identity().clone();

        let err = open(&message, bob(), Perspective::Receiver, alice().identity())
            .expect_err("forged sender");
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_own_message_must_name_the_chat_remote() {
        let to_bob = seal("hello");
        assert!(open(&to_bob, alice(), Perspective::Sender, bob().identity()).is_ok());

        let err = open(&to_bob, alice(), Perspective::Sender, eve().identity())
            .expect_err("replayed into another chat");
        assert!(matches!(err, Error::Crypto(_)));

        let mut no_receiver = to_bob.clone();
        no_receiver.receiver = None;
        assert!(open(&no_receiver, alice(), Perspective::Sender, bob().identity()).is_err());
    }
}
