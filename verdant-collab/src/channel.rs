//! Push channel delivering server operations for one project.
//!
//! Provides:
//! - Connection lifecycle (open, clean close, reconnect with backoff)
//! - In-order delivery of decoded operations, malformed frames dropped
//! - A terminal `Failed` state once the reconnect budget is spent
//!
//! ```text
//! Disconnected ──open──► Connecting ──ok──► Open
//!      ▲                     │                │ error / server close
//!      │                     │ error          ▼
//!      └──── backoff ◄───────┴──────── Disconnected ──budget spent──► Failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;
use verdant_core::Operation;

use crate::config::ReconnectPolicy;
use crate::error::SyncError;

/// Reason sent with the close frame of a deliberate shutdown.
pub const CLEAN_CLOSE_REASON: &str = "session closed";

/// Channel connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Open,
    /// Reconnect budget spent. Only [`PatchChannel::reset`] leaves this state.
    Failed,
}

/// Events emitted by the channel, in the order they happen.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    /// A decoded operation, in network order.
    Operation(Operation),
    /// The connection attempt failed or an open connection dropped.
    Lost { reason: String },
    Reconnecting { attempt: u32, delay: Duration },
    /// Emitted once; no further reconnect is scheduled.
    Exhausted { attempts: u32 },
    /// A deliberate close completed.
    Closed,
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The push channel for one session and project.
///
/// At most one connection task runs at a time. [`PatchChannel::open`] while
/// connecting, open, waiting to reconnect or failed is a no-op.
pub struct PatchChannel {
    url: Url,
    policy: ReconnectPolicy,
    state: Arc<RwLock<ChannelState>>,
    event_tx: mpsc::Sender<ChannelEvent>,
    event_rx: Option<mpsc::Receiver<ChannelEvent>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PatchChannel {
    pub fn new(url: Url, policy: ReconnectPolicy, buffer: usize) -> Self {
        let (event_tx, event_rx) = mpsc::channel(buffer.max(1));
        Self {
            url,
            policy,
            state: Arc::new(RwLock::new(ChannelState::Disconnected)),
            event_tx,
            event_rx: Some(event_rx),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<ChannelEvent>> {
        self.event_rx.take()
    }

    /// Start connecting in the background.
    ///
    /// Returns `false` without doing anything when a connection task is
    /// already alive or the channel has failed.
    pub async fn open(&mut self) -> bool {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }
        {
            let mut state = self.state.write().await;
            if *state != ChannelState::Disconnected {
                return false;
            }
            *state = ChannelState::Connecting;
        }

        self.cancel = CancellationToken::new();
        let link = Link {
            url: self.url.clone(),
            policy: self.policy.clone(),
            state: self.state.clone(),
            events: self.event_tx.clone(),
            cancel: self.cancel.clone(),
        };
        self.task = Some(tokio::spawn(link.run()));
        true
    }

    /// Close deliberately. Cancels any pending reconnect, sends a normal
    /// close frame if connected, and waits for the task to finish.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("patch channel task ended abnormally: {e}");
            }
        }
        let mut state = self.state.write().await;
        if *state != ChannelState::Failed {
            *state = ChannelState::Disconnected;
        }
    }

    /// Leave `Failed` so the channel can be opened again.
    pub async fn reset(&mut self) -> bool {
        let mut state = self.state.write().await;
        if *state != ChannelState::Failed {
            return false;
        }
        *state = ChannelState::Disconnected;
        true
    }

    pub async fn state(&self) -> ChannelState {
        *self.state.read().await
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Drop for PatchChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Everything the background task owns.
struct Link {
    url: Url,
    policy: ReconnectPolicy,
    state: Arc<RwLock<ChannelState>>,
    events: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
}

enum Exit {
    Cancelled,
    Lost(String),
}

impl Link {
    async fn run(self) {
        let mut failures: u32 = 0;
        loop {
            self.set(ChannelState::Connecting).await;
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                attempt = tokio_tungstenite::connect_async(self.url.as_str()) => attempt,
            };

            let reason = match attempt {
                Ok((mut socket, _)) => {
                    failures = 0;
                    self.set(ChannelState::Open).await;
                    log::info!("patch channel open: {}", self.url);
                    if !self.emit(ChannelEvent::Opened).await {
                        close_clean(&mut socket).await;
                        break;
                    }
                    match self.pump(socket).await {
                        Exit::Cancelled => break,
                        Exit::Lost(reason) => reason,
                    }
                }
                Err(e) => {
                    failures += 1;
                    e.to_string()
                }
            };

            self.set(ChannelState::Disconnected).await;
            log::warn!(
                "{} ({failures} consecutive failed attempts)",
                SyncError::Channel(reason.clone())
            );
            if !self.emit(ChannelEvent::Lost { reason }).await {
                break;
            }

            if self.policy.is_exhausted(failures) {
                self.set(ChannelState::Failed).await;
                log::error!("{}", SyncError::ChannelExhausted { attempts: failures });
                self.emit(ChannelEvent::Exhausted { attempts: failures }).await;
                return;
            }

            let delay = self.policy.delay_after(failures);
            let attempt = failures + 1;
            log::info!("reconnecting to {} in {delay:?} (attempt {attempt})", self.url);
            if !self.emit(ChannelEvent::Reconnecting { attempt, delay }).await {
                break;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set(ChannelState::Disconnected).await;
        log::info!("patch channel closed: {}", self.url);
        let _ = self.events.try_send(ChannelEvent::Closed);
    }

    /// Forward frames until the connection ends or the channel is cancelled.
    ///
    /// Every `Exit::Cancelled` path sends a normal close frame first.
    async fn pump(&self, mut socket: Socket) -> Exit {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                frame = socket.next() => Some(frame),
            };
            let Some(frame) = frame else {
                close_clean(&mut socket).await;
                return Exit::Cancelled;
            };

            let delivered = match frame {
                Some(Ok(Message::Text(text))) => self.deliver(text.as_str()).await,
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.deliver(text).await,
                    Err(e) => {
                        log::warn!("dropping non-UTF-8 binary frame: {e}");
                        true
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("server closed ({}): {}", f.code, f.reason))
                        .unwrap_or_else(|| "server closed".to_string());
                    return Exit::Lost(reason);
                }
                Some(Ok(_)) => true,
                Some(Err(e)) => return Exit::Lost(e.to_string()),
                None => return Exit::Lost("stream ended".to_string()),
            };
            if !delivered {
                close_clean(&mut socket).await;
                return Exit::Cancelled;
            }
        }
    }

    /// Decode and forward one message. Returns `false` once the receiver is
    /// gone or the channel was cancelled.
    async fn deliver(&self, text: &str) -> bool {
        match Operation::from_json(text) {
            Ok(op) => self.emit(ChannelEvent::Operation(op)).await,
            Err(e) => {
                log::warn!("dropping message: {}", SyncError::from(e));
                true
            }
        }
    }

    async fn emit(&self, event: ChannelEvent) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }

    async fn set(&self, next: ChannelState) {
        *self.state.write().await = next;
    }
}

async fn close_clean(socket: &mut Socket) {
    let close = CloseFrame {
        code: CloseCode::Normal,
        reason: CLEAN_CLOSE_REASON.into(),
    };
    if let Err(e) = socket.close(Some(close)).await {
        log::debug!("close handshake failed: {e}");
    }
}
