//! Real-time client — the explicitly owned entry point feature code talks to.
//!
//! [`RealtimeClient::create`] spawns the supervisor task and returns the
//! owner; [`RealtimeClient::shutdown`] stops it. Feature modules get a
//! cloneable [`ClientHandle`] to connect, register listeners and watch the
//! connected flag. Nothing here blocks: `connect` only enqueues the request,
//! completion shows up on [`ClientHandle::connected`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::debug;

use crate::config::RealtimeConfig;
use crate::error::AppError;
use crate::router::{Listener, Router};
use crate::supervisor::Supervisor;
use crate::supervisor::backoff::RetryPolicy;
use crate::supervisor::control::{ControlCallError, ControlCommand, ControlHandle, SupervisorControl};
use crate::supervisor::endpoint::Endpoint;
use crate::supervisor::status::{ConnectionState, StatusPublisher, StatusSnapshot};
use crate::transport::Connector;

/// Everything the supervisor needs that is not a collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub endpoint: Endpoint,
    pub policy: RetryPolicy,
    /// Control queue depth.
    pub command_buffer: usize,
}

impl ClientSettings {
    pub fn new(origin: impl Into<String>) -> Self {
        Self { endpoint: Endpoint::new(origin), policy: RetryPolicy::default(), command_buffer: 32 }
    }
}

impl From<&RealtimeConfig> for ClientSettings {
    fn from(cfg: &RealtimeConfig) -> Self {
        Self {
            endpoint: Endpoint { origin: cfg.origin.clone(), port: cfg.port, path: cfg.path.clone() },
            policy: RetryPolicy {
                base_delay: Duration::from_millis(cfg.base_delay_ms),
                max_attempts: cfg.max_attempts,
            },
            command_buffer: cfg.command_buffer,
        }
    }
}

// ── ClientHandle ──────────────────────────────────────────────────────────────

/// Cheap to clone — all fields are reference-counted.
#[derive(Clone)]
pub struct ClientHandle {
    control: ControlHandle,
    router: Arc<Router>,
    status: Arc<StatusPublisher>,
}

impl ClientHandle {
    /// Ask for a connection. A no-op while one is open or opening.
    ///
    /// Never waits: fails with [`ControlCallError::Full`] when the control
    /// queue is at capacity and nothing is enqueued. Use
    /// [`connect_queued`](Self::connect_queued) to wait for space instead.
    pub fn connect(&self, identity: Option<u64>) -> Result<(), ControlCallError> {
        self.control.notify(ControlCommand::Connect { identity })
    }

    /// Close the connection and stop retrying.
    ///
    /// Never waits: on [`ControlCallError::Full`] the request is dropped and
    /// the connection stays up. Use
    /// [`disconnect_queued`](Self::disconnect_queued) when it must go through.
    pub fn disconnect(&self) -> Result<(), ControlCallError> {
        self.control.notify(ControlCommand::Disconnect)
    }

    /// [`connect`](Self::connect), waiting for queue space.
    pub async fn connect_queued(&self, identity: Option<u64>) -> Result<(), ControlCallError> {
        self.control.send(ControlCommand::Connect { identity }).await
    }

    /// [`disconnect`](Self::disconnect), waiting for queue space. Only fails
    /// once the supervisor has exited.
    pub async fn disconnect_queued(&self) -> Result<(), ControlCallError> {
        self.control.send(ControlCommand::Disconnect).await
    }

    pub fn on(&self, kind: &str, listener: &Listener) -> bool {
        self.router.on(kind, listener)
    }

    pub fn off(&self, kind: &str, listener: &Listener) -> bool {
        self.router.off(kind, listener)
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Watch the connected flag. The receiver starts at the current value.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.status.subscribe_connected()
    }

    pub fn is_connected(&self) -> bool {
        *self.status.subscribe_connected().borrow()
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.status.subscribe_state()
    }

    /// Snapshot of supervisor internals, answered after every command queued
    /// before it has been processed.
    pub async fn status(&self) -> Result<StatusSnapshot, ControlCallError> {
        self.control.status().await
    }
}

// ── RealtimeClient ────────────────────────────────────────────────────────────

pub struct RealtimeClient {
    handle: ClientHandle,
    /// Cancels the supervisor if the client is dropped without `shutdown`.
    guard: DropGuard,
    task: JoinHandle<()>,
}

impl RealtimeClient {
    /// Spawn the supervisor task. Must be called inside a Tokio runtime.
    pub fn create(settings: ClientSettings, connector: Arc<dyn Connector>) -> Self {
        let router = Arc::new(Router::new());
        let status = Arc::new(StatusPublisher::new());
        let control = SupervisorControl::new(settings.command_buffer);
        let shutdown = CancellationToken::new();

        let supervisor = Supervisor::new(
            settings.endpoint,
            settings.policy,
            connector,
            router.clone(),
            status.clone(),
        );
        let task = tokio::spawn(supervisor.run(control.rx, shutdown.clone()));

        Self {
            handle: ClientHandle { control: control.handle, router, status },
            guard: shutdown.drop_guard(),
            task,
        }
    }

    pub fn handle(&self) -> ClientHandle {
        self.handle.clone()
    }

    /// Close any live connection and wait for the supervisor to exit.
    pub async fn shutdown(self) -> Result<(), AppError> {
        let RealtimeClient { handle, guard, task } = self;
        drop(guard);
        task.await
            .map_err(|e| AppError::Client(format!("supervisor task failed: {e}")))?;
        debug!(connected = handle.is_connected(), "realtime client shut down");
        Ok(())
    }
}
