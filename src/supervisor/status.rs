//! Observable connection status.
//!
//! Two `watch` cells: a plain `connected` boolean for UI-style consumers and
//! the detailed [`ConnectionState`]. A `watch::Receiver` always starts from
//! the latest value, so late subscribers never see a stale initial read.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
        }
    }
}

/// Point-in-time view of the supervisor, answered over the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: ConnectionState,
    /// Consecutive retries since the last successful open.
    pub retry_count: u32,
    /// A retry timer is armed.
    pub retry_pending: bool,
    pub identity: Option<u64>,
    /// Retries ran out; only an explicit connect resumes.
    pub exhausted: bool,
}

/// Sender half, owned by the supervisor task.
pub struct StatusPublisher {
    connected: watch::Sender<bool>,
    state: watch::Sender<ConnectionState>,
}

impl StatusPublisher {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(false);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self { connected, state }
    }

    /// Move to `state`; `connected` follows and is republished even when it
    /// did not change, so every failed attempt is visible as `false`.
    pub fn set(&self, state: ConnectionState) {
        self.state.send_replace(state);
        let open = state == ConnectionState::Open;
        match state {
            ConnectionState::Open | ConnectionState::Disconnected => {
                self.connected.send_replace(open);
            }
            ConnectionState::Connecting | ConnectionState::Closing => {
                self.connected.send_if_modified(|c| std::mem::replace(c, false));
            }
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

impl Default for StatusPublisher {
    fn default() -> Self {
        Self::new()
    }
}
