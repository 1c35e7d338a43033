//! Client configuration.
//!
//! Server address and key-file locations are process configuration owned by
//! the front-end; the core only consumes the resolved values.

use std::path::PathBuf;
use std::time::Duration;

/// Default relay server address (`host:port`).
pub const DEFAULT_SERVER: &str = "127.0.0.1:5000";

/// Default timeout for opening the realtime channel.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default period of the channel health check.
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Default pause before retrying a failed read.
pub const DEFAULT_READ_BACKOFF: Duration = Duration::from_millis(500);

/// Default transport chunk size; a shorter chunk terminates a frame.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Tuning for the realtime sync channel.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on connect + handshake.
    pub connect_timeout: Duration,
    /// How often the health check inspects the channel.
    pub health_check_interval: Duration,
    /// Backoff after a failed read before the next attempt.
    pub read_backoff: Duration,
    /// Maximum chunk size requested from the transport.
    pub chunk_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            read_backoff: DEFAULT_READ_BACKOFF,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Relay server as `host:port`.
    pub server: String,
    /// PEM file holding the local public key.
    pub public_key_path: PathBuf,
    /// PEM file holding the local private key.
    pub private_key_path: PathBuf,
    /// Realtime channel tuning.
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: DEFAULT_SERVER.to_string(),
            public_key_path: PathBuf::from("public.pem"),
            private_key_path: PathBuf::from("private.pem"),
            sync: SyncConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Base URL of the HTTP collaborator.
    pub fn http_base(&self) -> String {
        format!("http://{}", self.server)
    }

    /// URI of the realtime websocket endpoint.
    pub fn ws_uri(&self) -> String {
        format!("ws://{}/ws", self.server)
    }
}
