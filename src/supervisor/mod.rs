//! Connection supervisor — owns the single live connection and its
//! reconnection policy.
//!
//! The supervisor is one Tokio task. Control commands, the in-flight connect
//! attempt, inbound frames, the retry timer and shutdown are multiplexed in a
//! single `select!` loop and handled one at a time, so the connection
//! handle, retry counter and timer need no locking.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Open
//!      ▲                        │                │ close / stream end
//!      │                        └─err─┐          ▼
//!      └──── retry timer ◀── schedule_reconnect ◀┘
//! ```
//!
//! `disconnect` from any state drops the timer and in-flight attempt, closes
//! the connection (`Closing`, at most [`CLOSE_TIMEOUT`]) and lands in
//! `Disconnected` with retries off.
//!
//! # Epochs
//!
//! Every in-flight attempt and armed retry records the epoch current when it
//! was created. `connect` and `disconnect` bump the epoch, so an outcome from
//! before the latest explicit request is discarded instead of reviving a
//! connection the caller asked to stop.

pub mod backoff;
pub mod control;
pub mod endpoint;
pub mod status;

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Sleep, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::envelope::Envelope;
use crate::router::Router;
use crate::transport::{ConnectFuture, Connection, Connector, Frame, TransportError};

use backoff::RetryPolicy;
use control::{ControlCommand, ControlMessage};
use endpoint::Endpoint;
use status::{ConnectionState, StatusPublisher, StatusSnapshot};

/// Longest wait for a close handshake before the connection is dropped.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

struct Attempt {
    epoch: u64,
    fut: ConnectFuture,
}

struct PendingRetry {
    epoch: u64,
    sleep: Pin<Box<Sleep>>,
}

enum Event {
    Shutdown,
    Control(Option<ControlMessage>),
    Attempt(u64, Result<Box<dyn Connection>, TransportError>),
    Frame(Option<Result<Frame, TransportError>>),
    RetryDue(u64),
}

pub struct Supervisor {
    endpoint: Endpoint,
    policy: RetryPolicy,
    connector: Arc<dyn Connector>,
    router: Arc<Router>,
    status: Arc<StatusPublisher>,

    conn: Option<Box<dyn Connection>>,
    attempt: Option<Attempt>,
    retry: Option<PendingRetry>,
    /// Consecutive retries since the last successful open.
    retries: u32,
    /// Identity from the last explicit connect; every retry reuses it.
    identity: Option<u64>,
    epoch: u64,
    /// Set by `disconnect`; suppresses automatic retries.
    stopped: bool,
    exhausted: bool,
}

impl Supervisor {
    pub fn new(
        endpoint: Endpoint,
        policy: RetryPolicy,
        connector: Arc<dyn Connector>,
        router: Arc<Router>,
        status: Arc<StatusPublisher>,
    ) -> Self {
        Self {
            endpoint,
            policy,
            connector,
            router,
            status,
            conn: None,
            attempt: None,
            retry: None,
            retries: 0,
            identity: None,
            epoch: 0,
            stopped: true,
            exhausted: false,
        }
    }

    /// Run until `shutdown` is cancelled or every control handle is dropped.
    /// Any live connection is closed on the way out.
    pub async fn run(mut self, mut control: mpsc::Receiver<ControlMessage>, shutdown: CancellationToken) {
        info!(
            origin = %self.endpoint.origin,
            port = self.endpoint.port,
            path = %self.endpoint.path,
            max_attempts = self.policy.max_attempts,
            base_delay_ms = self.policy.base_delay.as_millis() as u64,
            "supervisor ready"
        );

        loop {
            let event = tokio::select! {
                biased;

                _ = shutdown.cancelled() => Event::Shutdown,
                msg = control.recv() => Event::Control(msg),
                (epoch, result) = attempt_outcome(&mut self.attempt) => Event::Attempt(epoch, result),
                frame = next_frame(&mut self.conn) => Event::Frame(frame),
                epoch = retry_due(&mut self.retry) => Event::RetryDue(epoch),
            };

            match event {
                Event::Shutdown => {
                    info!("supervisor shutting down");
                    break;
                }
                Event::Control(None) => {
                    info!("control channel closed, supervisor exiting");
                    break;
                }
                Event::Control(Some(msg)) => self.handle_control(msg).await,
                Event::Attempt(epoch, result) => {
                    self.attempt = None;
                    self.on_attempt(epoch, result);
                }
                Event::Frame(frame) => self.on_frame(frame),
                Event::RetryDue(epoch) => {
                    self.retry = None;
                    self.on_retry_due(epoch);
                }
            }
        }

        self.disconnect().await;
    }

    async fn handle_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Command(ControlCommand::Connect { identity }) => self.connect(identity),
            ControlMessage::Command(ControlCommand::Disconnect) => self.disconnect().await,
            ControlMessage::Status { reply_tx } => {
                let _ = reply_tx.send(self.snapshot());
            }
        }
    }

    fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.status.state(),
            retry_count: self.retries,
            retry_pending: self.retry.is_some(),
            identity: self.identity,
            exhausted: self.exhausted,
        }
    }

    // ── explicit requests ────────────────────────────────────────────────────

    fn connect(&mut self, identity: Option<u64>) {
        if self.conn.is_some() || self.attempt.is_some() {
            debug!(state = self.status.state().as_str(), "connect ignored, connection already live");
            return;
        }

        self.epoch += 1;
        self.retry = None;
        self.retries = 0;
        self.exhausted = false;
        self.stopped = false;
        self.identity = identity;
        info!(?identity, "connect requested");
        self.open();
    }

    async fn disconnect(&mut self) {
        self.epoch += 1;
        self.stopped = true;
        if self.retry.take().is_some() {
            debug!("pending reconnect cancelled");
        }
        if self.attempt.take().is_some() {
            debug!("in-flight connect attempt abandoned");
        }
        if let Some(mut conn) = self.conn.take() {
            self.status.set(ConnectionState::Closing);
            if timeout(CLOSE_TIMEOUT, conn.close()).await.is_err() {
                debug!(timeout_ms = CLOSE_TIMEOUT.as_millis() as u64, "close handshake timed out, dropping connection");
            }
            info!("disconnected");
        }
        self.status.set(ConnectionState::Disconnected);
        self.retries = 0;
        self.exhausted = false;
    }

    // ── connection lifecycle ─────────────────────────────────────────────────

    /// Start an attempt with the stored identity. Failure to even build the
    /// target goes straight to the reconnect path.
    fn open(&mut self) {
        let url = match self.endpoint.target(self.identity) {
            Ok(url) => url,
            Err(e) => {
                warn!("cannot build connection target: {e}");
                self.status.set(ConnectionState::Disconnected);
                self.schedule_reconnect();
                return;
            }
        };

        debug!(%url, attempt = self.retries, "opening connection");
        self.status.set(ConnectionState::Connecting);
        self.attempt = Some(Attempt { epoch: self.epoch, fut: self.connector.connect(&url) });
    }

    fn on_attempt(&mut self, epoch: u64, result: Result<Box<dyn Connection>, TransportError>) {
        if epoch != self.epoch {
            debug!(epoch, current = self.epoch, "stale connect outcome discarded");
            return;
        }

        match result {
            Ok(conn) => {
                self.conn = Some(conn);
                self.retries = 0;
                self.exhausted = false;
                self.status.set(ConnectionState::Open);
                info!(identity = ?self.identity, "connected");
            }
            Err(e) => {
                warn!(attempt = self.retries, "connection attempt failed: {e}");
                self.status.set(ConnectionState::Disconnected);
                self.schedule_reconnect();
            }
        }
    }

    fn on_frame(&mut self, frame: Option<Result<Frame, TransportError>>) {
        match frame {
            Some(Ok(Frame::Text(text))) => self.deliver(Envelope::parse(&text)),
            Some(Ok(Frame::Binary(bytes))) => self.deliver(Envelope::parse_bytes(&bytes)),
            // The close that follows drives recovery.
            Some(Err(e)) => warn!("transport error: {e}"),
            None => self.on_closed(),
        }
    }

    fn deliver(&self, decoded: Result<Envelope, serde_json::Error>) {
        match decoded {
            Ok(envelope) => {
                let report = self.router.dispatch(&envelope);
                trace!(
                    kind = %envelope.kind,
                    delivered = report.delivered,
                    failed = report.failed,
                    "message dispatched"
                );
            }
            Err(e) => warn!("dropping undecodable message: {e}"),
        }
    }

    fn on_closed(&mut self) {
        self.conn = None;
        self.status.set(ConnectionState::Disconnected);
        info!("connection closed");
        if !self.stopped {
            self.schedule_reconnect();
        }
    }

    // ── reconnection ─────────────────────────────────────────────────────────

    fn schedule_reconnect(&mut self) {
        if self.policy.is_exhausted(self.retries) {
            if !self.exhausted {
                self.exhausted = true;
                error!(attempts = self.retries, "max reconnect attempts reached, giving up");
            }
            return;
        }

        self.retries += 1;
        let delay = self.policy.delay_for(self.retries);
        info!(attempt = self.retries, delay_ms = delay.as_millis() as u64, "reconnecting");
        // Replacing the slot drops any timer that was still armed.
        self.retry = Some(PendingRetry { epoch: self.epoch, sleep: Box::pin(sleep(delay)) });
    }

    fn on_retry_due(&mut self, epoch: u64) {
        if epoch != self.epoch || self.stopped {
            debug!(epoch, current = self.epoch, "stale reconnect discarded");
            return;
        }
        if self.conn.is_some() || self.attempt.is_some() {
            return;
        }
        self.open();
    }
}

// ── select! arms ──────────────────────────────────────────────────────────────

async fn attempt_outcome(
    attempt: &mut Option<Attempt>,
) -> (u64, Result<Box<dyn Connection>, TransportError>) {
    match attempt {
        Some(a) => {
            let result = (&mut a.fut).await;
            (a.epoch, result)
        }
        None => std::future::pending().await,
    }
}

async fn next_frame(conn: &mut Option<Box<dyn Connection>>) -> Option<Result<Frame, TransportError>> {
    match conn {
        Some(c) => c.recv().await,
        None => std::future::pending().await,
    }
}

async fn retry_due(retry: &mut Option<PendingRetry>) -> u64 {
    match retry {
        Some(r) => {
            r.sleep.as_mut().await;
            r.epoch
        }
        None => std::future::pending().await,
    }
}
