//! Realtime sync channel.
//!
//! One long-lived connection to the relay's `/ws` endpoint:
//!
//! - [`SyncChannel`]: connection lifecycle (`Disconnected → Connecting →
//!   Ready`), health check driven reconnects and the read loop
//! - [`Connector`] / [`Transport`]: the seam between the channel and the
//!   wire; [`WebSocketConnector`] is the production implementation
//! - [`receive_frame`]: reassembly of chunked delivery into one frame
//!
//! Frames carry no length prefix. A logical message ends with the first
//! chunk shorter than the chunk size.
//!
//! Messages pushed while the channel is `Disconnected` are not replayed
//! after a reconnect; a history fetch over HTTP is the only way to recover
//! them.

mod channel;
mod transport;
mod websocket;

pub use channel::{ChannelState, FrameHandler, SyncChannel};
pub use transport::{receive_frame, Connector, Transport};
pub use websocket::{WebSocketConnector, WebSocketTransport};
