//! The set of known correspondents.

use crate::identity::Identity;
use crate::protocol::{Message, MessageId};
use std::collections::HashMap;

/// Envelopes kept per background chat; the oldest are dropped first.
pub const MAX_PENDING: usize = 256;

/// A two-party conversation between the local identity and one remote.
#[derive(Debug, Clone)]
pub struct Chat {
    local: Identity,
    remote: Identity,
    name: String,
    pending: Vec<Message>,
}

impl Chat {
    fn new(local: Identity, remote: Identity, name: Option<String>) -> Self {
        let name = name.unwrap_or_else(|| remote.fingerprint().to_string());
        Self {
            local,
            remote,
            name,
            pending: Vec::new(),
        }
    }

    /// The local side of the pairing.
    pub fn local(&self) -> &Identity {
        &self.local
    }

    /// The correspondent.
    pub fn remote(&self) -> &Identity {
        &self.remote
    }

    /// Display name; defaults to the remote fingerprint.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Envelopes received while this chat was not focused.
    pub fn pending(&self) -> &[Message] {
        &self.pending
    }

    /// Queue an envelope for later display. Re-deliveries of an id already
    /// queued are ignored. At most [`MAX_PENDING`] envelopes are kept.
    pub(crate) fn queue_pending(&mut self, message: Message) {
        if message.id.is_some() && self.pending.iter().any(|m| m.id == message.id) {
            return;
        }
        self.pending.push(message);
        if self.pending.len() > MAX_PENDING {
            let excess = self.pending.len() - MAX_PENDING;
            self.pending.drain(..excess);
        }
    }

    pub(crate) fn drop_pending(&mut self, id: MessageId) {
        self.pending.retain(|m| m.id != Some(id));
    }

    pub(crate) fn take_pending(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.pending)
    }
}

/// All known chats, keyed by remote fingerprint, in creation order.
///
/// Holds at most one chat per remote fingerprint.
#[derive(Debug, Clone)]
pub struct ChatDirectory {
    local: Identity,
    chats: Vec<Chat>,
    index: HashMap<String, usize>,
}

impl ChatDirectory {
    /// Create an empty directory for the local identity.
    pub fn new(local: Identity) -> Self {
        Self {
            local,
            chats: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Whether a chat with `remote` exists.
    pub fn exists(&self, remote: &Identity) -> bool {
        self.index.contains_key(remote.fingerprint())
    }

    /// Add a chat named after the remote fingerprint.
    ///
    /// Returns `false` if the chat already existed.
    pub fn add(&mut self, remote: Identity) -> bool {
        self.add_named(remote, None)
    }

    /// Add a chat with an optional display name.
    ///
    /// Returns `false`, leaving the existing chat untouched, if the chat
    /// already existed.
    pub fn add_named(&mut self, remote: Identity, name: Option<String>) -> bool {
        if self.exists(&remote) {
            return false;
        }
        self.index
            .insert(remote.fingerprint().to_string(), self.chats.len());
        self.chats.push(Chat::new(self.local.clone(), remote, name));
        true
    }

    /// Look up a chat by remote identity.
    pub fn get(&self, remote: &Identity) -> Option<&Chat> {
        self.index.get(remote.fingerprint()).map(|&i| &self.chats[i])
    }

    pub(crate) fn get_mut(&mut self, remote: &Identity) -> Option<&mut Chat> {
        match self.index.get(remote.fingerprint()) {
            Some(&i) => self.chats.get_mut(i),
            None => None,
        }
    }

    /// All chats in creation order.
    pub fn list_all(&self) -> &[Chat] {
        &self.chats
    }

    /// Number of chats.
    pub fn len(&self) -> usize {
        self.chats.len()
    }

    /// Whether the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.chats.is_empty()
    }
}
