//! Error types for SecureChat.
//!
//! Display strings are kept generic: most of what flows through the core is
//! relay-controlled input, and its details are not echoed back.

use thiserror::Error;

/// Core error type for SecureChat operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Decryption or signature verification failed.
    /// Details are intentionally vague to prevent oracle attacks.
    #[error("cryptographic operation failed")]
    Crypto(String),

    /// Key material could not be parsed or does not form a usable RSA key.
    #[error("invalid key material")]
    InvalidKey(String),

    /// Local identity could not be loaded or stored.
    #[error("identity error: {0}")]
    Identity(String),

    /// Malformed frame, envelope or unknown action.
    #[error("protocol error")]
    Protocol(String),

    /// Base64, hex or UTF-8 decoding failed.
    #[error("encoding error")]
    Encoding(String),

    /// Transport-level failure, including a handle replaced mid-read.
    #[error("transport error: {0}")]
    Transport(String),

    /// The realtime channel is not in the `Ready` state.
    #[error("channel not ready")]
    NotReady,

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The HTTP collaborator answered with a non-success status.
    #[error("http request failed with status {status}")]
    Http {
        /// HTTP status code (0 when no response was received).
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Filesystem error.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Result type alias using SecureChat's Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors on relay-controlled input: drop the message or frame, never retry.
    pub fn should_silent_drop(&self) -> bool {
        matches!(
            self,
            Error::Crypto(_) | Error::InvalidKey(_) | Error::Protocol(_) | Error::Encoding(_)
        )
    }

    /// Errors the read loop and health check recover from by retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::NotReady | Error::Timeout)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Protocol(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Error::Http {
                status: status.as_u16(),
                body: String::new(),
            },
            None if e.is_timeout() => Error::Timeout,
            None => Error::Transport(e.to_string()),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(e.to_string())
    }
}
