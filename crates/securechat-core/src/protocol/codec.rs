//! JSON encoding and decoding of envelopes and server events.

use super::types::{Message, MessageId};
use crate::error::{Error, Result};
use crate::identity::Identity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An event pushed by the relay over the realtime channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A new message addressed to us.
    Add(Message),
    /// The sender withdrew a message.
    Delete {
        /// Identifier of the withdrawn message.
        id: MessageId,
        /// Author of the withdrawn message.
        sender: Identity,
    },
    /// An action this client does not understand.
    Unknown {
        /// The action name as received.
        action: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum WireEvent {
    Add(Message),
    Delete(DeleteNotice),
}

#[derive(Serialize, Deserialize)]
struct DeleteNotice {
    id: MessageId,
    sender: Identity,
}

/// One entry of the `/chats` response.
#[derive(Deserialize)]
struct ChatPair {
    user1: Identity,
    user2: Identity,
}

/// Decode one realtime frame into a server event.
///
/// Invalid UTF-8, invalid JSON, a missing `action` or malformed fields of a
/// known action are protocol errors.
pub fn decode_event(frame: &[u8]) -> Result<ServerEvent> {
    let text = std::str::from_utf8(frame)
        .map_err(|_| Error::Protocol("frame is not valid UTF-8".into()))?;
    let value: Value = serde_json::from_str(text)?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Protocol("frame has no action".into()))?
        .to_string();

    match action.as_str() {
        "add" | "delete" => match serde_json::from_value::<WireEvent>(value)? {
            WireEvent::Add(message) => Ok(ServerEvent::Add(message)),
            WireEvent::Delete(notice) => Ok(ServerEvent::Delete {
                id: notice.id,
                sender: notice.sender,
            }),
        },
        _ => Ok(ServerEvent::Unknown { action }),
    }
}

/// Encode a server event as a realtime frame.
pub fn encode_event(event: &ServerEvent) -> Result<String> {
    let wire = match event {
        ServerEvent::Add(message) => WireEvent::Add(message.clone()),
        ServerEvent::Delete { id, sender } => WireEvent::Delete(DeleteNotice {
            id: *id,
            sender: sender.clone(),
        }),
        ServerEvent::Unknown { action } => {
            return Err(Error::Protocol(format!("cannot encode action {:?}", action)))
        }
    };
    Ok(serde_json::to_string(&wire)?)
}

/// Encode an envelope as the JSON body of `POST /messages`.
pub fn encode_message(message: &Message) -> Result<String> {
    Ok(serde_json::to_string(message)?)
}

/// Decode the `/messages` history response.
pub fn decode_message_list(body: &str) -> Result<Vec<Message>> {
    Ok(serde_json::from_str(body)?)
}

/// Decode the `/chats` response into the remote side of every pair.
pub fn decode_chat_list(body: &str, local: &Identity) -> Result<Vec<Identity>> {
    let pairs: Vec<ChatPair> = serde_json::from_str(body)?;
    Ok(pairs
        .into_iter()
        .map(|pair| {
            if pair.user1 != *local {
                pair.user1
            } else {
                pair.user2
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(modulus: &str) -> Identity {
        Identity::from_hex(modulus, "10001").expect("identity")
    }

    #[test]
    fn test_decode_add_event() {
        let frame = br#"{
            "action": "add",
            "id": 7,
            "sender": {"modulus": "A1B2", "exponent": "10001"},
            "text": "q83vEjRWeJA=",
            "receiverEncryptedKey": "AAEC",
            "signature": "c2ln",
            "timestamp": 1700000000000
        }"#;

        let event = decode_event(frame).expect("decode");
        let ServerEvent::Add(message) = event else {
            panic!("expected add");
        };
        assert_eq!(message.id, Some(7));
        assert_eq!(message.sender.fingerprint(), "a1b2");
        assert_eq!(message.receiver, None);
        assert_eq!(message.body, "q83vEjRWeJA=");
        assert_eq!(message.sender_encrypted_key, None);
        assert_eq!(message.receiver_encrypted_key.as_deref(), Some("AAEC"));
        assert_eq!(message.signature, "c2ln");
        assert_eq!(message.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn test_decode_delete_event() {
        let frame = br#"{"action":"delete","id":42,"sender":{"modulus":"c3d4","exponent":"10001"}}"#;
        let event = decode_event(frame).expect("decode");
        assert_eq!(
            event,
            ServerEvent::Delete {
                id: 42,
                sender: identity("c3d4"),
            }
        );
    }

    #[test]
    fn test_unknown_action_is_preserved() {
        let event = decode_event(br#"{"action":"typing","who":"x"}"#).expect("decode");
        assert_eq!(
            event,
            ServerEvent::Unknown {
                action: "typing".into()
            }
        );
    }

    #[test]
    fn test_malformed_frames_are_protocol_errors() {
        let cases: &[&[u8]] = &[
            b"",
            b"not json",
            b"[1,2,3]",
            br#"{"id": 1}"#,
            br#"{"action": 5}"#,
            br#"{"action":"delete","id":"forty-two","sender":{"modulus":"c3d4","exponent":"10001"}}"#,
            br#"{"action":"delete","id":42,"sender":{"modulus":"zz","exponent":"10001"}}"#,
            br#"{"action":"add","text":"AA=="}"#,
            &[0xff, 0xfe, 0x00],
        ];
        for frame in cases {
            let err = decode_event(frame).expect_err("must reject");
            assert!(matches!(err, Error::Protocol(_)), "{:?}", err);
        }
    }

    #[test]
    fn test_event_encoding_is_decodable() {
        let message = Message {
            id: Some(3),
            sender: identity("a1b2"),
            receiver: Some(identity("c3d4")),
            body: "Ym9keQ==".into(),
            sender_encrypted_key: Some("c2Vr".into()),
            receiver_encrypted_key: Some("cmVr".into()),
            signature: "c2ln".into(),
            timestamp: 12,
        };
        let frame = encode_event(&ServerEvent::Add(message.clone())).expect("encode");
        assert!(frame.contains(r#""action":"add""#));
        assert_eq!(decode_event(frame.as_bytes()).expect("decode"), ServerEvent::Add(message));

        let unknown = ServerEvent::Unknown {
            action: "typing".into(),
        };
        assert!(encode_event(&unknown).is_err());
    }

    #[test]
    fn test_message_body_field_names() {
        let message = Message {
            id: None,
            sender: identity("A1B2"),
            receiver: Some(identity("C3D4")),
            body: "Ym9keQ==".into(),
            sender_encrypted_key: Some("c2Vr".into()),
            receiver_encrypted_key: Some("cmVr".into()),
            signature: "c2ln".into(),
            timestamp: 99,
        };
        let json: Value = serde_json::from_str(&encode_message(&message).expect("encode"))
            .expect("valid json");

        assert!(json.get("id").is_none());
        assert_eq!(json["sender"]["modulus"], "a1b2");
        assert_eq!(json["receiver"]["modulus"], "c3d4");
        assert_eq!(json["text"], "Ym9keQ==");
        assert_eq!(json["senderEncryptedKey"], "c2Vr");
        assert_eq!(json["receiverEncryptedKey"], "cmVr");
        assert_eq!(json["signature"], "c2ln");
        assert_eq!(json["timestamp"], 99);
    }

    #[test]
    fn test_decode_chat_list_picks_remote_side() {
        let local = identity("a1b2");
        let body = r#"[
            {"user1": {"modulus": "a1b2", "exponent": "10001"},
             "user2": {"modulus": "c3d4", "exponent": "10001"}},
            {"user1": {"modulus": "E5F6", "exponent": "3"},
             "user2": {"modulus": "a1b2", "exponent": "10001"}}
        ]"#;

        let remotes = decode_chat_list(body, &local).expect("decode");
        let fingerprints: Vec<_> = remotes.iter().map(|i| i.fingerprint()).collect();
        assert_eq!(fingerprints, vec!["c3d4", "e5f6"]);
        assert_eq!(remotes[1].exponent_hex(), "3");
    }

    #[test]
    fn test_decode_message_list() {
        let body = r#"[
            {"id": 1, "sender": {"modulus": "a1b2", "exponent": "10001"},
             "receiver": {"modulus": "c3d4", "exponent": "10001"},
             "text": "AA==", "senderEncryptedKey": "AQ==", "receiverEncryptedKey": "Ag==",
             "signature": "Aw==", "timestamp": 5}
        ]"#;
        let messages = decode_message_list(body).expect("decode");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, Some(1));
        assert_eq!(messages[0].sender_encrypted_key.as_deref(), Some("AQ=="));
        assert!(decode_message_list("{}").is_err());
    }
}
