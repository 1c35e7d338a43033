//! Wire protocol for SecureChat.
//!
//! The relay speaks JSON. Two kinds of documents cross the wire:
//!
//! - **Message envelopes**, posted over HTTP and returned by history
//!   queries: `{id?, sender, receiver, text, senderEncryptedKey,
//!   receiverEncryptedKey, signature, timestamp}`.
//! - **Server events**, pushed over the realtime channel:
//!   `{"action": "add", ...envelope}` or
//!   `{"action": "delete", "id": .., "sender": {..}}`.
//!
//! ## Protocol Rules
//!
//! - Base64 fields round-trip byte-exact; they are never re-encoded.
//! - Hex fields are case-insensitive on input, lowercase on output.
//! - A frame that cannot be decoded is a protocol error: it is dropped and
//!   the channel stays up.
//! - Unrecognized actions decode to [`ServerEvent::Unknown`] so the
//!   dispatcher decides what to do with them.

mod codec;
mod types;

pub use codec::{
    decode_chat_list, decode_event, decode_message_list, encode_event, encode_message,
    ServerEvent,
};
pub use types::{DecryptedMessage, Message, MessageId};

use crate::identity::Identity;

/// The realtime handshake: the local fingerprint sent as the first frame.
///
/// It is a session-binding token for the relay, not a secret.
pub fn handshake_frame(identity: &Identity) -> String {
    identity.fingerprint().to_string()
}
