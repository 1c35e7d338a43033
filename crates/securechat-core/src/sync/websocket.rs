//! WebSocket transport over `tokio-tungstenite`.

use super::transport::{Connector, Transport};
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens [`WebSocketTransport`]s.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, uri: &str) -> Result<Arc<dyn Transport>> {
        let (stream, _response) = connect_async(uri).await?;
        debug!(uri = %uri, "WebSocket connected");
        Ok(Arc::new(WebSocketTransport::new(stream)))
    }
}

/// Read side: the message currently being served as chunks.
struct ReadState {
    stream: SplitStream<WsStream>,
    pending: Vec<u8>,
    offset: usize,
    terminator_due: bool,
}

/// A WebSocket connection that serves each inbound message as fixed-size
/// chunks.
///
/// A message whose length is an exact multiple of the chunk size is
/// followed by a zero-length chunk, so readers always see a short chunk at
/// the end of a message.
pub struct WebSocketTransport {
    sink: Mutex<SplitSink<WsStream, WsMessage>>,
    reader: Mutex<ReadState>,
    open: AtomicBool,
}

impl WebSocketTransport {
    fn new(stream: WsStream) -> Self {
        let (sink, stream) = stream.split();
        Self {
            sink: Mutex::new(sink),
            reader: Mutex::new(ReadState {
                stream,
                pending: Vec::new(),
                offset: 0,
                terminator_due: false,
            }),
            open: AtomicBool::new(true),
        }
    }

    fn closed(&self, reason: &str) -> Error {
        self.open.store(false, Ordering::SeqCst);
        Error::Transport(reason.to_string())
    }

    async fn next_message(&self, state: &mut ReadState) -> Result<Vec<u8>> {
        loop {
            match state.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => return Ok(text.into_bytes()),
                Some(Ok(WsMessage::Binary(data))) => return Ok(data),
                Some(Ok(WsMessage::Close(_))) | None => {
                    return Err(self.closed("connection closed by server"))
                }
                // Control frames carry no application data.
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.open.store(false, Ordering::SeqCst);
                    return Err(e.into());
                }
            }
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            return Err(Error::Transport("transport aborted".into()));
        }
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(WsMessage::Text(text.to_string())).await {
            self.open.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    async fn recv_chunk(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.is_open() {
            return Err(Error::Transport("transport aborted".into()));
        }
        if buf.is_empty() {
            return Ok(0);
        }

        let mut state = self.reader.lock().await;
        if state.terminator_due {
            state.terminator_due = false;
            return Ok(0);
        }
        if state.offset >= state.pending.len() {
            let message = self.next_message(&mut state).await?;
            state.pending = message;
            state.offset = 0;
        }

        let remaining = &state.pending[state.offset..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        state.offset += n;
        if state.offset == state.pending.len() && n == buf.len() {
            state.terminator_due = true;
        }
        Ok(n)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn abort(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}
