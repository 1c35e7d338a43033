//! Connection lifecycle for the realtime channel.

use super::transport::{receive_frame, Connector, Transport};
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::identity::Identity;
use crate::logging::ShortFingerprint;
use crate::protocol::handshake_frame;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Lifecycle state of a [`SyncChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No usable transport.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// Handshake sent; frames can be read.
    Ready,
}

/// Consumer of reassembled frames.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    /// Handle one frame. Errors are logged by the read loop, which keeps
    /// going.
    async fn handle_frame(&self, frame: &[u8]) -> Result<()>;
}

/// An installed transport plus its invalidation signal.
///
/// Readers subscribe to `invalidated` before reading; replacing the handle
/// flips it so in-flight reads fail instead of hanging on a dead transport.
struct TransportHandle {
    transport: Arc<dyn Transport>,
    invalidated: watch::Sender<bool>,
}

impl TransportHandle {
    fn new(transport: Arc<dyn Transport>) -> Self {
        let (invalidated, _) = watch::channel(false);
        Self {
            transport,
            invalidated,
        }
    }

    fn invalidate(&self) {
        self.invalidated.send_replace(true);
        self.transport.abort();
    }
}

/// The single long-lived realtime connection of a client.
///
/// The transport lives in a mutex-guarded slot. Writers (connect, the
/// health check) replace it; readers take a snapshot per frame and treat a
/// replaced handle as a retryable transport error.
pub struct SyncChannel {
    connector: Arc<dyn Connector>,
    uri: String,
    identity: Identity,
    config: SyncConfig,
    state: watch::Sender<ChannelState>,
    slot: Mutex<Option<Arc<TransportHandle>>>,
    reconnecting: Mutex<()>,
}

impl SyncChannel {
    /// Create a disconnected channel for `identity` talking to `uri`.
    pub fn new(
        connector: Arc<dyn Connector>,
        uri: impl Into<String>,
        identity: Identity,
        config: SyncConfig,
    ) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            connector,
            uri: uri.into(),
            identity,
            config,
            state,
            slot: Mutex::new(None),
            reconnecting: Mutex::new(()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = ?previous, to = ?state, "Channel state changed");
        }
    }

    /// Open a transport and send the handshake.
    ///
    /// Bounded by the configured connect timeout; a timed-out attempt is
    /// dropped together with any partially opened transport. Failures leave
    /// the channel `Disconnected` and are retryable.
    pub async fn connect(&self) -> Result<()> {
        self.set_state(ChannelState::Connecting);

        let attempt = async {
            let transport = self.connector.connect(&self.uri).await?;
            if let Err(e) = transport.send_text(&handshake_frame(&self.identity)).await {
                transport.abort();
                return Err(e);
            }
            Ok::<_, Error>(transport)
        };

        match tokio::time::timeout(self.config.connect_timeout, attempt).await {
            Ok(Ok(transport)) => {
                self.install(transport).await;
                info!(
                    uri = %self.uri,
                    identity = %ShortFingerprint(self.identity.fingerprint()),
                    "Realtime channel ready"
                );
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(ChannelState::Disconnected);
                warn!(uri = %self.uri, error = %e, "Connect failed");
                Err(e)
            }
            Err(_) => {
                self.set_state(ChannelState::Disconnected);
                warn!(uri = %self.uri, timeout = ?self.config.connect_timeout, "Connect timed out");
                Err(Error::Timeout)
            }
        }
    }

    /// Swap in a new transport and mark the channel `Ready`.
    ///
    /// Slot and state change under the same lock as [`Self::on_read_failure`],
    /// so a failure on the old handle cannot overwrite `Ready`.
    async fn install(&self, transport: Arc<dyn Transport>) {
        let handle = Arc::new(TransportHandle::new(transport));
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.replace(handle) {
            previous.invalidate();
        }
        self.set_state(ChannelState::Ready);
    }

    /// Invalidate and release the current transport, if any.
    async fn teardown(&self) {
        let previous = self.slot.lock().await.take();
        if let Some(previous) = previous {
            previous.invalidate();
        }
        self.set_state(ChannelState::Disconnected);
    }

    async fn snapshot(&self) -> Option<Arc<TransportHandle>> {
        self.slot.lock().await.clone()
    }

    /// Whether the channel is `Ready` with a live transport.
    pub async fn is_healthy(&self) -> bool {
        if self.state() != ChannelState::Ready {
            return false;
        }
        match self.snapshot().await {
            Some(handle) => handle.transport.is_open(),
            None => false,
        }
    }

    /// Tear down the current transport and connect again.
    ///
    /// At most one reconnect cycle runs at a time; a call made while one is
    /// in flight returns immediately.
    pub async fn reconnect(&self) -> Result<()> {
        let Ok(_cycle) = self.reconnecting.try_lock() else {
            debug!("Reconnect already in flight");
            return Ok(());
        };
        self.teardown().await;
        self.connect().await
    }

    /// One health check: reconnect unless the channel is healthy.
    pub async fn health_check_tick(&self) -> Result<()> {
        if self.is_healthy().await {
            return Ok(());
        }
        self.reconnect().await
    }

    /// Run the health check on its interval for the life of the process.
    ///
    /// The first tick fires immediately, so this also performs the initial
    /// connect.
    pub fn spawn_health_check(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.health_check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.health_check_tick().await {
                    debug!(error = %e, "Health check reconnect failed");
                }
            }
        })
    }

    /// Block until one complete frame arrives.
    ///
    /// Fails with [`Error::NotReady`] when not `Ready`, and with
    /// [`Error::Transport`] when the transport fails or is replaced while
    /// the read is in flight. Both are retryable.
    pub async fn receive_frame(&self) -> Result<Vec<u8>> {
        if self.state() != ChannelState::Ready {
            return Err(Error::NotReady);
        }
        let handle = self.snapshot().await.ok_or(Error::NotReady)?;

        let mut invalidated = handle.invalidated.subscribe();
        if *invalidated.borrow() {
            return Err(Error::Transport("transport handle replaced".into()));
        }

        let result = tokio::select! {
            result = receive_frame(handle.transport.as_ref(), self.config.chunk_size) => result,
            _ = invalidated.changed() => {
                Err(Error::Transport("transport handle replaced mid-read".into()))
            }
        };

        if let Err(e) = &result {
            self.on_read_failure(&handle, e).await;
        }
        result
    }

    async fn on_read_failure(&self, handle: &Arc<TransportHandle>, error: &Error) {
        let mut slot = self.slot.lock().await;
        let current = matches!(slot.as_ref(), Some(h) if Arc::ptr_eq(h, handle));
        if current {
            debug!(error = %error, "Transport failed; waiting for health check");
            slot.take();
            handle.invalidate();
            self.set_state(ChannelState::Disconnected);
        }
    }

    /// Read frames forever, handing each to `handler`.
    ///
    /// Read errors (including "not ready") back off for the configured
    /// interval and retry; handler errors are logged and the loop carries
    /// on. Never returns.
    pub async fn run(&self, handler: &dyn FrameHandler) {
        loop {
            match self.receive_frame().await {
                Ok(frame) if frame.is_empty() => continue,
                Ok(frame) => {
                    if let Err(e) = handler.handle_frame(&frame).await {
                        debug!(error = %e, size = frame.len(), "Frame dropped by handler");
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Read failed, backing off");
                    tokio::time::sleep(self.config.read_backoff).await;
                }
            }
        }
    }

    /// Spawn [`SyncChannel::run`] on its own task.
    pub fn spawn_read_loop(self: Arc<Self>, handler: Arc<dyn FrameHandler>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(handler.as_ref()).await })
    }
}
