//! Client for the relay's HTTP endpoints.
//!
//! Every signed request is signed over the exact bytes that go on the wire
//! (query string or JSON body), so the builders below produce strings and
//! the client sends them unchanged.

use crate::config::ClientConfig;
use crate::crypto::{self, sign, Perspective};
use crate::error::{Error, Result};
use crate::identity::{Identity, KeyPair};
use crate::logging::ShortFingerprint;
use crate::now_millis;
use crate::protocol::{
    decode_chat_list, decode_message_list, encode_message, DecryptedMessage, MessageId,
};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "Signature";

/// Upper bound on a single HTTP exchange.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Query for `GET /chats`.
pub fn chats_query(local: &Identity, timestamp: i64) -> String {
    format!(
        "modulus={}&exponent={}&timestamp={}",
        local.fingerprint(),
        local.exponent_hex(),
        timestamp
    )
}

/// Query for `GET /messages`.
pub fn history_query(local: &Identity, remote: &Identity) -> String {
    format!(
        "requestingUserModulus={}&requestingUserExponent={}&requestedUserModulus={}&requestedUserExponent={}",
        local.fingerprint(),
        local.exponent_hex(),
        remote.fingerprint(),
        remote.exponent_hex()
    )
}

#[derive(Serialize)]
struct DeleteRequest {
    id: MessageId,
    signature: String,
}

/// Body for `DELETE /messages`: the id plus a signature over its decimal
/// form.
pub fn delete_body(id: MessageId, keypair: &KeyPair) -> Result<String> {
    let request = DeleteRequest {
        id,
        signature: sign(&id.to_string(), keypair.private_key())?,
    };
    Ok(serde_json::to_string(&request)?)
}

#[derive(Serialize)]
struct ChatReadRequest<'a> {
    receiver: &'a Identity,
    sender: &'a Identity,
    timestamp: i64,
}

/// Body for `POST /makeChatRead`: the local user has read everything
/// `remote` sent up to `timestamp`.
pub fn chat_read_body(local: &Identity, remote: &Identity, timestamp: i64) -> Result<String> {
    let request = ChatReadRequest {
        receiver: local,
        sender: remote,
        timestamp,
    };
    Ok(serde_json::to_string(&request)?)
}

/// Parse the decimal id returned by `POST /messages`.
pub fn parse_message_id(body: &str) -> Result<MessageId> {
    body.trim()
        .parse()
        .map_err(|_| Error::Protocol(format!("invalid message id {:?}", body.trim())))
}

/// HTTP client bound to one relay and one local key pair.
#[derive(Debug, Clone)]
pub struct RelayApi {
    client: reqwest::Client,
    base: String,
    keypair: Arc<KeyPair>,
}

impl RelayApi {
    /// Create a client for the relay named in `config`.
    pub fn new(config: &ClientConfig, keypair: Arc<KeyPair>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base: config.http_base(),
            keypair,
        })
    }

    /// The local identity.
    pub fn identity(&self) -> &Identity {
        self.keypair.identity()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Chats other users opened with us, e.g. while we were offline.
    pub async fn discover_chats(&self) -> Result<Vec<Identity>> {
        let local = self.keypair.identity();
        let query = chats_query(local, now_millis());
        let signature = sign(&query, self.keypair.private_key())?;

        let response = self
            .client
            .get(format!("{}?{}", self.url("/chats"), query))
            .header(SIGNATURE_HEADER, signature)
            .send()
            .await?;
        let body = successful_body(response).await?;

        let remotes = decode_chat_list(&body, local)?;
        info!(count = remotes.len(), "Discovered chats");
        Ok(remotes)
    }

    /// History with `remote`, oldest first.
    ///
    /// Every entry is decrypted and verified against the two participants of
    /// this chat; entries that fail, or that name anyone else, are left out.
    pub async fn fetch_history(&self, remote: &Identity) -> Result<Vec<DecryptedMessage>> {
        let local = self.keypair.identity();
        let query = history_query(local, remote);

        let response = self
            .client
            .get(format!("{}?{}", self.url("/messages"), query))
            .send()
            .await?;
        let body = successful_body(response).await?;

        let envelopes = decode_message_list(&body)?;
        let total = envelopes.len();
        let accepted: Vec<_> = envelopes
            .iter()
            .filter_map(|message| {
                let perspective = Perspective::of(message, local);
                match crypto::open(message, &self.keypair, perspective, remote) {
                    Ok(decrypted) => Some(decrypted),
                    Err(e) => {
                        debug!(id = ?message.id, error = ?e, "Rejected history entry");
                        None
                    }
                }
            })
            .collect();

        debug!(
            remote = %ShortFingerprint(remote.fingerprint()),
            total,
            accepted = accepted.len(),
            "Fetched history"
        );
        Ok(accepted)
    }

    /// Encrypt, sign and post `plaintext` to `remote`.
    ///
    /// Returns the local view of the message, carrying the id assigned by
    /// the relay.
    pub async fn post_message(
        &self,
        remote: &Identity,
        plaintext: &str,
    ) -> Result<DecryptedMessage> {
        let remote_key = remote.to_public_key()?;
        let timestamp = now_millis();
        let message = crypto::encrypt(
            plaintext,
            &self.keypair.public_key(),
            &remote_key,
            self.keypair.private_key(),
        )?
        .with_timestamp(timestamp);

        let body = encode_message(&message)?;
        let signature = sign(&body, self.keypair.private_key())?;

        let response = self
            .client
            .post(self.url("/messages"))
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;
        let id = parse_message_id(&successful_body(response).await?)?;

        debug!(id, remote = %ShortFingerprint(remote.fingerprint()), "Message posted");
        Ok(DecryptedMessage {
            id: Some(id),
            body: plaintext.to_string(),
            sender: self.keypair.identity().fingerprint().to_string(),
            timestamp,
        })
    }

    /// Delete one of our own messages.
    pub async fn delete_message(&self, id: MessageId) -> Result<()> {
        let body = delete_body(id, &self.keypair)?;
        let response = self
            .client
            .delete(self.url("/messages"))
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        successful_body(response).await?;
        debug!(id, "Message deleted");
        Ok(())
    }

    /// Mark everything `remote` sent us as read.
    pub async fn mark_chat_read(&self, remote: &Identity) -> Result<()> {
        let body = chat_read_body(self.keypair.identity(), remote, now_millis())?;
        let signature = sign(&body, self.keypair.private_key())?;
        let response = self
            .client
            .post(self.url("/makeChatRead"))
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(body)
            .send()
            .await?;
        successful_body(response).await?;
        Ok(())
    }
}

/// Body of a 2xx response, or [`Error::Http`].
async fn successful_body(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(Error::Http {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
