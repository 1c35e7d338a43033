//! Transport abstraction and chunked frame reassembly.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// A live, bidirectional connection delivering bounded chunks.
///
/// Methods take `&self` so a reader can be mid-`recv_chunk` while another
/// task aborts the transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one text frame.
    async fn send_text(&self, text: &str) -> Result<()>;

    /// Read the next chunk into `buf`, returning the number of bytes
    /// written. A return value smaller than `buf.len()` ends the current
    /// logical message.
    async fn recv_chunk(&self, buf: &mut [u8]) -> Result<usize>;

    /// Whether the transport still looks usable.
    fn is_open(&self) -> bool;

    /// Mark the transport dead and release what can be released without
    /// blocking.
    fn abort(&self);
}

/// Opens transports to a server URI.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establish a new transport. No application data has been exchanged
    /// when this returns.
    async fn connect(&self, uri: &str) -> Result<Arc<dyn Transport>>;
}

/// Read chunks of `chunk_size` bytes until a short chunk arrives and return
/// their concatenation.
pub async fn receive_frame(transport: &dyn Transport, chunk_size: usize) -> Result<Vec<u8>> {
    if chunk_size == 0 {
        return Err(Error::Transport("chunk size must be non-zero".into()));
    }

    let mut frame = Vec::new();
    let mut chunk = vec![0u8; chunk_size];
    loop {
        let n = transport.recv_chunk(&mut chunk).await?;
        if n > chunk_size {
            return Err(Error::Transport(format!(
                "transport returned {} bytes for a {} byte chunk",
                n, chunk_size
            )));
        }
        frame.extend_from_slice(&chunk[..n]);
        if n < chunk_size {
            return Ok(frame);
        }
    }
}
