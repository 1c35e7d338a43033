//! Routing of decoded server events into chat state.

use super::directory::{Chat, ChatDirectory};
use crate::crypto::MessageOpener;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::logging::{RedactedBytes, ShortFingerprint};
use crate::protocol::{decode_event, DecryptedMessage, Message, MessageId, ServerEvent};
use crate::sync::FrameHandler;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

/// Capacity of the UI event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A chat was created, either by the user or by a first inbound message.
    ChatAdded {
        /// The new correspondent.
        remote: Identity,
    },
    /// A verified message was appended to the focused transcript.
    MessageShown {
        /// The message.
        message: DecryptedMessage,
    },
    /// A message was removed from the focused transcript.
    MessageRemoved {
        /// Identifier of the removed message.
        id: MessageId,
    },
    /// A realtime frame could not be understood and was discarded.
    FrameDropped {
        /// Short description of the problem.
        reason: String,
    },
}

/// The chat that is currently on screen.
#[derive(Debug, Clone)]
pub struct FocusedChat {
    remote: Identity,
    transcript: Vec<DecryptedMessage>,
}

impl FocusedChat {
    /// The correspondent of the focused chat.
    pub fn remote(&self) -> &Identity {
        &self.remote
    }

    /// Verified messages in display order.
    pub fn transcript(&self) -> &[DecryptedMessage] {
        &self.transcript
    }

    fn contains(&self, id: Option<MessageId>) -> bool {
        id.is_some() && self.transcript.iter().any(|m| m.id == id)
    }

    fn remove(&mut self, id: MessageId) -> bool {
        let before = self.transcript.len();
        self.transcript.retain(|m| m.id != Some(id));
        self.transcript.len() != before
    }
}

/// Directory plus focus, guarded together so a focus change cannot race an
/// inbound `add`.
#[derive(Debug, Clone)]
pub struct ChatState {
    directory: ChatDirectory,
    focus: Option<FocusedChat>,
}

impl ChatState {
    /// Known chats.
    pub fn directory(&self) -> &ChatDirectory {
        &self.directory
    }

    /// The focused chat, if any.
    pub fn focus(&self) -> Option<&FocusedChat> {
        self.focus.as_ref()
    }

    fn is_focused(&self, remote: &Identity) -> bool {
        self.focus.as_ref().map_or(false, |f| &f.remote == remote)
    }
}

/// Applies server events to chat state and notifies the UI.
pub struct EventDispatcher {
    state: Mutex<ChatState>,
    opener: Arc<dyn MessageOpener>,
    event_tx: broadcast::Sender<ChatEvent>,
}

impl EventDispatcher {
    /// Create a dispatcher for the local identity.
    ///
    /// `opener` performs decrypt+verify for every message that is about to
    /// be shown.
    pub fn new(local: Identity, opener: Arc<dyn MessageOpener>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state: Mutex::new(ChatState {
                directory: ChatDirectory::new(local),
                focus: None,
            }),
            opener,
            event_tx,
        }
    }

    /// Subscribe to UI notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.event_tx.subscribe()
    }

    /// Decode a frame and dispatch it.
    pub async fn dispatch_frame(&self, frame: &[u8]) -> Result<()> {
        let event = match decode_event(frame) {
            Ok(event) => event,
            Err(e) => {
                warn!(frame = %RedactedBytes(frame), error = ?e, "Dropping undecodable frame");
                self.emit(ChatEvent::FrameDropped {
                    reason: "undecodable frame".into(),
                });
                return Err(e);
            }
        };
        self.dispatch(event).await
    }

    /// Apply one server event.
    pub async fn dispatch(&self, event: ServerEvent) -> Result<()> {
        match event {
            ServerEvent::Add(message) => {
                self.handle_add(message).await;
                Ok(())
            }
            ServerEvent::Delete { id, sender } => {
                self.handle_delete(id, &sender).await;
                Ok(())
            }
            ServerEvent::Unknown { action } => {
                warn!(action = %action, "Dropping frame with unrecognized action");
                self.emit(ChatEvent::FrameDropped {
                    reason: format!("unrecognized action {:?}", action),
                });
                Err(Error::Protocol(format!("unrecognized action {:?}", action)))
            }
        }
    }

    async fn handle_add(&self, message: Message) {
        let mut state = self.state.lock().await;
        let sender = message.sender.clone();

        if state.directory.add(sender.clone()) {
            debug!(sender = %ShortFingerprint(sender.fingerprint()), "Chat created by inbound message");
            self.emit(ChatEvent::ChatAdded {
                remote: sender.clone(),
            });
        }

        if !state.is_focused(&sender) {
            if let Some(chat) = state.directory.get_mut(&sender) {
                chat.queue_pending(message);
            }
            return;
        }

        let decrypted = match self.opener.open(&message, &sender) {
            Ok(decrypted) => decrypted,
            Err(e) => {
                debug!(
                    sender = %ShortFingerprint(sender.fingerprint()),
                    error = ?e,
                    "Rejected message"
                );
                return;
            }
        };

        if let Some(focus) = state.focus.as_mut() {
            if focus.contains(decrypted.id) {
                return;
            }
            focus.transcript.push(decrypted.clone());
            self.emit(ChatEvent::MessageShown { message: decrypted });
        }
    }

    async fn handle_delete(&self, id: MessageId, sender: &Identity) {
        let mut state = self.state.lock().await;

        if !state.is_focused(sender) {
            if let Some(chat) = state.directory.get_mut(sender) {
                chat.drop_pending(id);
            }
            return;
        }

        if let Some(focus) = state.focus.as_mut() {
            if focus.remove(id) {
                self.emit(ChatEvent::MessageRemoved { id });
            }
        }
    }

    /// Add a chat explicitly (user action). Returns `false` if it existed.
    pub async fn add_chat(&self, remote: Identity, name: Option<String>) -> bool {
        let mut state = self.state.lock().await;
        let added = state.directory.add_named(remote.clone(), name);
        if added {
            self.emit(ChatEvent::ChatAdded { remote });
        }
        added
    }

    /// Put `remote` on screen.
    ///
    /// The transcript is seeded with `history` (already verified, e.g. from a
    /// history fetch); envelopes queued while the chat was in the background
    /// are then opened and appended unless already present. Returns the
    /// resulting transcript.
    pub async fn focus(
        &self,
        remote: Identity,
        history: Vec<DecryptedMessage>,
    ) -> Vec<DecryptedMessage> {
        let mut state = self.state.lock().await;

        if state.directory.add(remote.clone()) {
            self.emit(ChatEvent::ChatAdded {
                remote: remote.clone(),
            });
        }
        let pending = state
            .directory
            .get_mut(&remote)
            .map(Chat::take_pending)
            .unwrap_or_default();

        let mut focus = FocusedChat {
            remote,
            transcript: history,
        };
        for message in pending {
            match self.opener.open(&message, &focus.remote) {
                Ok(decrypted) if !focus.contains(decrypted.id) => focus.transcript.push(decrypted),
                Ok(_) => {}
                Err(e) => debug!(error = ?e, "Rejected queued message"),
            }
        }

        let transcript = focus.transcript.clone();
        state.focus = Some(focus);
        transcript
    }

    /// Take the focused chat off screen.
    pub async fn clear_focus(&self) {
        self.state.lock().await.focus = None;
    }

    /// Remote identity of the focused chat.
    pub async fn focused_remote(&self) -> Option<Identity> {
        let state = self.state.lock().await;
        state.focus.as_ref().map(|f| f.remote.clone())
    }

    /// Snapshot of the focused transcript (empty when nothing is focused).
    pub async fn transcript(&self) -> Vec<DecryptedMessage> {
        let state = self.state.lock().await;
        state
            .focus
            .as_ref()
            .map(|f| f.transcript.clone())
            .unwrap_or_default()
    }

    /// Consistent copy of directory and focus.
    pub async fn snapshot(&self) -> ChatState {
        self.state.lock().await.clone()
    }

    /// Snapshot of all chats in creation order.
    pub async fn chats(&self) -> Vec<Chat> {
        self.state.lock().await.directory.list_all().to_vec()
    }

    /// Remove a message from the focused transcript after a local delete.
    pub async fn remove_local(&self, id: MessageId) -> bool {
        let mut state = self.state.lock().await;
        let removed = state.focus.as_mut().map_or(false, |f| f.remove(id));
        if removed {
            self.emit(ChatEvent::MessageRemoved { id });
        }
        removed
    }

    /// Append a message the local user just sent to the focused transcript.
    pub async fn push_local(&self, message: DecryptedMessage) {
        let mut state = self.state.lock().await;
        if let Some(focus) = state.focus.as_mut() {
            if !focus.contains(message.id) {
                focus.transcript.push(message.clone());
                self.emit(ChatEvent::MessageShown { message });
            }
        }
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine; the UI may not be attached yet.
        let _ = self.event_tx.send(event);
    }
}

#[async_trait]
impl FrameHandler for EventDispatcher {
    async fn handle_frame(&self, frame: &[u8]) -> Result<()> {
        self.dispatch_frame(frame).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts messages from the chat remote whose signature field reads "ok".
    struct StubOpener;

    impl MessageOpener for StubOpener {
        fn open(&self, message: &Message, remote: &Identity) -> Result<DecryptedMessage> {
            if &message.sender != remote {
                return Err(Error::Crypto("wrong chat".into()));
            }
            if message.signature != "ok" {
                return Err(Error::Crypto("bad signature".into()));
            }
            Ok(DecryptedMessage {
                id: message.id,
                body: message.body.clone(),
                sender: message.sender.fingerprint().to_string(),
                timestamp: message.timestamp,
            })
        }
    }

    fn identity(modulus: &str) -> Identity {
        Identity::from_hex(modulus, "10001").expect("identity")
    }

    fn dispatcher() -> EventDispatcher {
        EventDispatcher::new(identity("a1b2"), Arc::new(StubOpener))
    }

    fn envelope(id: i64, sender: &str, body: &str, signature: &str) -> Message {
        Message {
            id: Some(id),
            sender: identity(sender),
            receiver: Some(identity("a1b2")),
            body: body.into(),
            sender_encrypted_key: None,
            receiver_encrypted_key: Some("AA==".into()),
            signature: signature.into(),
            timestamp: id,
        }
    }

    fn shown(id: i64, sender: &str, body: &str) -> DecryptedMessage {
        DecryptedMessage {
            id: Some(id),
            body: body.into(),
            sender: sender.into(),
            timestamp: id,
        }
    }

    #[tokio::test]
    async fn test_add_from_unknown_sender_creates_one_chat() {
        let d = dispatcher();
        let mut events = d.subscribe();

        d.dispatch(ServerEvent::Add(envelope(1, "c3d4", "x", "ok")))
            .await
            .expect("dispatch");
        d.dispatch(ServerEvent::Add(envelope(2, "c3d4", "y", "ok")))
            .await
            .expect("dispatch");

        let chats = d.chats().await;
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].remote().fingerprint(), "c3d4");
        assert_eq!(chats[0].pending().len(), 2);

        assert_eq!(
            events.try_recv().expect("event"),
            ChatEvent::ChatAdded {
                remote: identity("c3d4")
            }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_adds_create_one_chat() {
        let d = Arc::new(dispatcher());
        let mut tasks = Vec::new();
        for i in 0..16 {
            let d = d.clone();
            tasks.push(tokio::spawn(async move {
                d.dispatch(ServerEvent::Add(envelope(i, "c3d4", "x", "ok")))
                    .await
            }));
        }
        for task in tasks {
            task.await.expect("join").expect("dispatch");
        }
        assert_eq!(d.chats().await.len(), 1);
    }

    #[tokio::test]
    async fn test_add_for_unfocused_sender_leaves_transcript_alone() {
        let d = dispatcher();
        d.focus(identity("e5f6"), vec![shown(10, "e5f6", "before")])
            .await;

        d.dispatch(ServerEvent::Add(envelope(11, "c3d4", "x", "ok")))
            .await
            .expect("dispatch");

        assert_eq!(d.transcript().await, vec![shown(10, "e5f6", "before")]);
    }

    #[tokio::test]
    async fn test_add_for_focused_sender_is_shown() {
        let d = dispatcher();
        d.focus(identity("c3d4"), Vec::new()).await;
        let mut events = d.subscribe();

        d.dispatch(ServerEvent::Add(envelope(5, "c3d4", "hello", "ok")))
            .await
            .expect("dispatch");

        assert_eq!(d.transcript().await, vec![shown(5, "c3d4", "hello")]);
        assert_eq!(
            events.try_recv().expect("event"),
            ChatEvent::MessageShown {
                message: shown(5, "c3d4", "hello")
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_message_is_dropped_silently() {
        let d = dispatcher();
        d.focus(identity("c3d4"), Vec::new()).await;
        let mut events = d.subscribe();

        d.dispatch(ServerEvent::Add(envelope(5, "c3d4", "forged", "bad")))
            .await
            .expect("crypto failure is not a dispatch error");

        assert!(d.transcript().await.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_redelivered_message_is_shown_once() {
        let d = dispatcher();
        d.focus(identity("c3d4"), Vec::new()).await;
        for _ in 0..2 {
            d.dispatch(ServerEvent::Add(envelope(5, "c3d4", "hello", "ok")))
                .await
                .expect("dispatch");
        }
        assert_eq!(d.transcript().await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_exactly_one_message() {
        let d = dispatcher();
        let history = vec![
            shown(41, "c3d4", "a"),
            shown(42, "c3d4", "b"),
            shown(43, "a1b2", "c"),
        ];
        d.focus(identity("c3d4"), history).await;

        d.dispatch(ServerEvent::Delete {
            id: 42,
            sender: identity("c3d4"),
        })
        .await
        .expect("dispatch");

        let ids: Vec<_> = d.transcript().await.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![Some(41), Some(43)]);
    }

    #[tokio::test]
    async fn test_delete_from_unfocused_sender_is_ignored() {
        let d = dispatcher();
        d.focus(identity("c3d4"), vec![shown(42, "c3d4", "b")]).await;

        d.dispatch(ServerEvent::Delete {
            id: 42,
            sender: identity("e5f6"),
        })
        .await
        .expect("dispatch");

        assert_eq!(d.transcript().await.len(), 1);
    }

    #[tokio::test]
    async fn test_focus_drains_pending_queue() {
        let d = dispatcher();
        d.dispatch(ServerEvent::Add(envelope(1, "c3d4", "one", "ok")))
            .await
            .expect("dispatch");
        d.dispatch(ServerEvent::Add(envelope(2, "c3d4", "two", "bad")))
            .await
            .expect("dispatch");
        d.dispatch(ServerEvent::Add(envelope(3, "c3d4", "three", "ok")))
            .await
            .expect("dispatch");
        d.dispatch(ServerEvent::Delete {
            id: 3,
            sender: identity("c3d4"),
        })
        .await
        .expect("dispatch");

        // id 1 also arrived through history; it must not be duplicated.
        let transcript = d
            .focus(identity("c3d4"), vec![shown(1, "c3d4", "one")])
            .await;

        assert_eq!(transcript, vec![shown(1, "c3d4", "one")]);
        let state = d.snapshot().await;
        assert!(state.directory().list_all()[0].pending().is_empty());
        assert_eq!(state.focus().map(|f| f.remote()), Some(&identity("c3d4")));
    }

    #[tokio::test]
    async fn test_unknown_action_is_protocol_error() {
        let d = dispatcher();
        let err = d
            .dispatch(ServerEvent::Unknown {
                action: "typing".into(),
            })
            .await
            .expect_err("unknown");
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_garbage_frame_is_dropped() {
        let d = dispatcher();
        let mut events = d.subscribe();
        let err = d.dispatch_frame(b"{oops").await.expect_err("garbage");
        assert!(err.should_silent_drop());
        assert!(matches!(
            events.try_recv().expect("event"),
            ChatEvent::FrameDropped { .. }
        ));
    }

    #[tokio::test]
    async fn test_explicit_add_chat() {
        let d = dispatcher();
        assert!(d.add_chat(identity("c3d4"), Some("Bob".into())).await);
        assert!(!d.add_chat(identity("c3d4"), None).await);
        assert_eq!(d.chats().await[0].name(), "Bob");
    }

    #[tokio::test]
    async fn test_local_push_and_remove() {
        let d = dispatcher();
        d.focus(identity("c3d4"), Vec::new()).await;
        d.push_local(shown(9, "a1b2", "mine")).await;
        assert_eq!(d.transcript().await.len(), 1);

        let mut events = d.subscribe();
        assert!(d.remove_local(9).await);
        assert!(!d.remove_local(9).await);
        assert!(d.transcript().await.is_empty());
        assert_eq!(
            events.try_recv().expect("event"),
            ChatEvent::MessageRemoved { id: 9 }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_remove_local_without_focus() {
        let d = dispatcher();
        let mut events = d.subscribe();
        assert!(!d.remove_local(9).await);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queued_messages_open_against_focused_remote() {
        let d = dispatcher();
        d.dispatch(ServerEvent::Add(envelope(1, "c3d4", "one", "ok")))
            .await
            .expect("dispatch");
        d.dispatch(ServerEvent::Add(envelope(2, "e5f6", "two", "ok")))
            .await
            .expect("dispatch");

        let transcript = d.focus(identity("c3d4"), Vec::new()).await;
        assert_eq!(transcript, vec![shown(1, "c3d4", "one")]);

        let state = d.snapshot().await;
        let other = state
            .directory()
            .get(&identity("e5f6"))
            .expect("second chat");
        assert_eq!(other.pending().len(), 1);
    }
}
