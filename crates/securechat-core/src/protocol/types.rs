//! Message envelope and its decrypted form.

use crate::identity::Identity;
use serde::{Deserialize, Serialize};

/// Server-assigned message identifier.
pub type MessageId = i64;

/// A message envelope as sent to and received from the relay.
///
/// Exactly one of the two wrapped keys is usable by any given reader: the
/// sender unwraps `sender_encrypted_key`, the receiver
/// `receiver_encrypted_key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Assigned by the server; absent until persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// Author of the message.
    pub sender: Identity,
    /// Addressee. Push events may omit it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<Identity>,
    /// Base64 of `iv || AES-256-CBC ciphertext`.
    #[serde(rename = "text")]
    pub body: String,
    /// Base64 RSA-OAEP wrap of the body key under the sender's public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_encrypted_key: Option<String>,
    /// Base64 RSA-OAEP wrap of the body key under the receiver's public key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_encrypted_key: Option<String>,
    /// Base64 signature over the plaintext by the sender's private key.
    pub signature: String,
    /// Unix time in milliseconds.
    #[serde(default)]
    pub timestamp: i64,
}

impl Message {
    /// Set the timestamp.
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Set the server-assigned identifier.
    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }
}

/// A message that passed decryption and signature verification.
///
/// Local only; never transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Server-assigned identifier, if the envelope carried one.
    pub id: Option<MessageId>,
    /// Plaintext body.
    pub body: String,
    /// Sender fingerprint.
    pub sender: String,
    /// Unix time in milliseconds.
    pub timestamp: i64,
}
