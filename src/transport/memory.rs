//! In-process transport — a connector whose "server" is driven by the caller.
//!
//! Every [`MemoryConnector::connect`] call surfaces as a [`PendingAttempt`]
//! on the paired [`MemoryServer`]. The server side decides the outcome:
//! [`PendingAttempt::accept`] yields a [`MemoryPeer`] that can push frames,
//! inject read errors and close the link; [`PendingAttempt::refuse`] (or
//! dropping the attempt) fails the connect.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{CloseFuture, ConnectFuture, Connection, Connector, Frame, RecvFuture, TransportError};

type AttemptReply = oneshot::Sender<Result<MemoryConnection, TransportError>>;

#[derive(Debug)]
enum PeerEvent {
    Frame(Frame),
    Error(String),
    Close,
}

// ── Connector ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MemoryConnector {
    attempts: mpsc::UnboundedSender<PendingAttempt>,
}

impl MemoryConnector {
    /// Build a connector and the server half that receives its attempts.
    pub fn pair() -> (Self, MemoryServer) {
        let (attempts, rx) = mpsc::unbounded_channel();
        (Self { attempts }, MemoryServer { rx })
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &Url) -> ConnectFuture {
        let (reply_tx, reply_rx) = oneshot::channel();
        let attempt = PendingAttempt { url: url.clone(), at: Instant::now(), reply_tx };
        let sent = self.attempts.send(attempt).is_ok();
        Box::pin(async move {
            if !sent {
                return Err(TransportError::Connect("memory server is gone".into()));
            }
            match reply_rx.await {
                Ok(Ok(conn)) => Ok(Box::new(conn) as Box<dyn Connection>),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TransportError::Connect("attempt dropped by server".into())),
            }
        })
    }
}

// ── Server side ───────────────────────────────────────────────────────────────

pub struct MemoryServer {
    rx: mpsc::UnboundedReceiver<PendingAttempt>,
}

impl MemoryServer {
    /// Wait for the next connect attempt. `None` once every connector clone
    /// is dropped.
    pub async fn next_attempt(&mut self) -> Option<PendingAttempt> {
        self.rx.recv().await
    }

    /// An attempt that has already been made, if any.
    pub fn try_next_attempt(&mut self) -> Option<PendingAttempt> {
        self.rx.try_recv().ok()
    }
}

pub struct PendingAttempt {
    url: Url,
    at: Instant,
    reply_tx: AttemptReply,
}

impl PendingAttempt {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// When `connect` was called on the connector.
    pub fn at(&self) -> Instant {
        self.at
    }

    /// Whether the connecting side has already given up on this attempt.
    pub fn is_abandoned(&self) -> bool {
        self.reply_tx.is_closed()
    }

    /// Complete the handshake. The returned peer is the server end.
    pub fn accept(self) -> MemoryPeer {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();
        let stall_close = Arc::new(AtomicBool::new(false));
        let conn = MemoryConnection { rx, closed: closed.clone(), stall_close: stall_close.clone() };
        // A send failure means the attempt was abandoned; the peer then sees
        // the link as already closed.
        if self.reply_tx.send(Ok(conn)).is_err() {
            closed.cancel();
        }
        MemoryPeer { tx, closed, stall_close }
    }

    pub fn refuse(self, reason: &str) {
        let _ = self.reply_tx.send(Err(TransportError::Connect(reason.to_string())));
    }
}

/// Server end of an accepted connection.
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<PeerEvent>,
    closed: CancellationToken,
    stall_close: Arc<AtomicBool>,
}

impl MemoryPeer {
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.tx.send(PeerEvent::Frame(Frame::Text(text.into())));
    }

    pub fn send_binary(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.tx.send(PeerEvent::Frame(Frame::Binary(bytes.into())));
    }

    /// Make the next read fail with a protocol error.
    pub fn fail(&self, reason: &str) {
        let _ = self.tx.send(PeerEvent::Error(reason.to_string()));
    }

    /// Close the link from the server side.
    pub fn close(&self) {
        let _ = self.tx.send(PeerEvent::Close);
    }

    /// Never answer the client's close handshake. The link only goes away
    /// once the client drops its end.
    pub fn stall_close(&self) {
        self.stall_close.store(true, Ordering::SeqCst);
    }

    /// Whether the client closed or dropped its end.
    pub fn is_closed_by_client(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub async fn closed_by_client(&self) {
        self.closed.cancelled().await;
    }
}

// ── Client side ───────────────────────────────────────────────────────────────

pub struct MemoryConnection {
    rx: mpsc::UnboundedReceiver<PeerEvent>,
    closed: CancellationToken,
    stall_close: Arc<AtomicBool>,
}

impl Connection for MemoryConnection {
    fn recv(&mut self) -> RecvFuture<'_> {
        Box::pin(async move {
            match self.rx.recv().await? {
                PeerEvent::Frame(frame) => Some(Ok(frame)),
                PeerEvent::Error(reason) => Some(Err(TransportError::Protocol(reason))),
                PeerEvent::Close => {
                    self.rx.close();
                    None
                }
            }
        })
    }

    fn close(&mut self) -> CloseFuture<'_> {
        Box::pin(async move {
            if self.stall_close.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.rx.close();
            self.closed.cancel();
        })
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}
