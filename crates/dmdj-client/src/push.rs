//! Push-state reducer — keeps one connection to the server's push channel
//! and folds every message into the process-wide [`Snapshot`].
//!
//! ```text
//!   Connecting ──ok──► Open ──(message)*──► Closed ──reconnect delay──► Connecting
//!        └──────────────────error──────────────┘
//! ```
//!
//! The reducer task is the only writer.  Readers get a `watch::Receiver`
//! through [`PushHandle`]; dropping the handle (or calling `shutdown`)
//! aborts the task, including a pending reconnect sleep.

use std::future::Future;
use std::time::Duration;

use dmdj_proto::protocol::{Snapshot, SnapshotUpdate};
use futures_util::{Stream, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// Default fixed delay between a close and the next connect attempt.
pub const DEFAULT_RECONNECT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Opens push connections.  A connection is a stream of text frames; the
/// stream ending or yielding `Err` means the connection closed.
pub trait PushTransport: Send + Sync + 'static {
    type Stream: Stream<Item = Result<String>> + Send + Unpin + 'static;

    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Stream>> + Send;
}

/// Parse one message and fold it into `snapshot`.  On error the snapshot is
/// left untouched.
pub fn apply_message(snapshot: &mut Snapshot, text: &str) -> Result<()> {
    let update = SnapshotUpdate::parse(text)?;
    let touched = snapshot.merge(update);
    debug!("push: updated {:?}", touched);
    Ok(())
}

/// Read side of a running reducer.
pub struct PushHandle {
    snapshot: watch::Receiver<Snapshot>,
    connection: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl PushHandle {
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    /// Accessor to inject into components that need live state.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.clone()
    }

    pub fn connection(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.connection.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection() == ConnectionState::Open
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for PushHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct PushReducer<T> {
    transport: T,
    url: String,
    reconnect_delay: Duration,
}

impl<T: PushTransport> PushReducer<T> {
    pub fn new(transport: T, url: impl Into<String>, reconnect_delay: Duration) -> Self {
        Self {
            transport,
            url: url.into(),
            reconnect_delay,
        }
    }

    pub fn spawn(self) -> PushHandle {
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let (conn_tx, conn_rx) = watch::channel(ConnectionState::Connecting);
        let task = tokio::spawn(self.run(snapshot_tx, conn_tx));
        PushHandle {
            snapshot: snapshot_rx,
            connection: conn_rx,
            task,
        }
    }

    async fn run(
        self,
        snapshot_tx: watch::Sender<Snapshot>,
        conn_tx: watch::Sender<ConnectionState>,
    ) {
        loop {
            conn_tx.send_replace(ConnectionState::Connecting);
            debug!("push: connecting to {}", self.url);

            match self.transport.connect(&self.url).await {
                Ok(mut stream) => {
                    info!("push: connected to {}", self.url);
                    conn_tx.send_replace(ConnectionState::Open);

                    while let Some(frame) = stream.next().await {
                        match frame {
                            Ok(text) => {
                                let mut parsed = Ok(());
                                snapshot_tx.send_if_modified(|snap| {
                                    let before = snap.clone();
                                    parsed = apply_message(snap, &text);
                                    *snap != before
                                });
                                if let Err(e) = parsed {
                                    warn!("push: dropping message: {}", e);
                                }
                            }
                            Err(e) => {
                                warn!("push: connection error: {}", e);
                                break;
                            }
                        }
                    }
                    info!("push: connection closed");
                }
                Err(e) => warn!("push: connect failed: {}", e),
            }

            conn_tx.send_replace(ConnectionState::Closed);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }
}

// ── WebSocket transport ───────────────────────────────────────────────────────

/// Push channel over a WebSocket (`ws://host/ws`).
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl PushTransport for WsTransport {
    type Stream = std::pin::Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Stream>> + Send {
        let url = url.to_string();
        async move {
            use tokio_tungstenite::tungstenite::Message;

            let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
                .await
                .map_err(|e| ClientError::Connection(e.to_string()))?;

            let frames = ws.filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    // Bad UTF-8 is a bad message, not a bad connection: the
                    // lossy text fails to parse and the reducer drops it.
                    Ok(Message::Binary(bytes)) => {
                        Some(Ok(String::from_utf8_lossy(&bytes).into_owned()))
                    }
                    Ok(Message::Close(_)) => Some(Err(ClientError::Connection(
                        "closed by server".to_string(),
                    ))),
                    Ok(_) => None,
                    Err(e) => Some(Err(ClientError::Connection(e.to_string()))),
                }
            });
            Ok(Box::pin(frames) as Self::Stream)
        }
    }
}
