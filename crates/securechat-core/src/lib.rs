//! # SecureChat Core Library
//!
//! The secure-messaging core of a two-party, end-to-end encrypted chat
//! client. Messages are relayed by an untrusted server that only ever sees
//! ciphertext, wrapped keys and signatures.
//!
//! ## Security Model
//!
//! - Every participant is an RSA key pair; the public modulus (lowercase hex)
//!   is the participant's fingerprint.
//! - Message bodies are AES-256-CBC encrypted under a fresh per-message key.
//! - The per-message key is wrapped with RSA-OAEP twice, once for the sender
//!   and once for the receiver.
//! - The plaintext is signed with the sender's private key (PKCS#1 v1.5,
//!   SHA-256); relay input is only accepted if decryption *and* signature
//!   verification succeed.
//!
//! ## Known Limitations
//!
//! - No forward secrecy and no key rotation.
//! - Messages pushed while the realtime channel is down are not backfilled on
//!   reconnect; a fresh history pull is required.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         UI layer (securechat-cli)       │
//! ├─────────────────────────────────────────┤
//! │  sync (channel)  │  messaging  │  api   │
//! ├─────────────────────────────────────────┤
//! │            protocol (codec)             │
//! ├─────────────────────────────────────────┤
//! │    crypto    │       identity           │
//! └─────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod api;
pub mod config;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod logging;
pub mod messaging;
pub mod protocol;
pub mod sync;

pub use config::{ClientConfig, SyncConfig};
pub use error::{Error, Result};
pub use identity::{Identity, KeyPair};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current Unix time in milliseconds, as used by message and request timestamps.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
