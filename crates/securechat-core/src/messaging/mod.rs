//! Chat state for SecureChat.
//!
//! - [`ChatDirectory`]: the known correspondents, one chat per fingerprint
//! - [`EventDispatcher`]: applies realtime events to the directory and the
//!   focused transcript, and notifies the UI through [`ChatEvent`]s
//!
//! Directory mutation and the focus check happen under one lock per event,
//! so a focus change never interleaves with an inbound `add`.

mod directory;
mod dispatcher;

pub use directory::{Chat, ChatDirectory, MAX_PENDING};
pub use dispatcher::{ChatEvent, ChatState, EventDispatcher, FocusedChat};
