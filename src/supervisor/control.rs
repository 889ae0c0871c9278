//! Supervisor control plane.
//!
//! Callers never touch supervisor state directly. They hold a cloneable
//! [`ControlHandle`] that enqueues [`ControlCommand`]s for the supervisor
//! task; queries carry a `oneshot` reply slot.

use std::{error::Error, fmt};

use tokio::sync::{mpsc, oneshot};

use super::status::StatusSnapshot;

/// Commands understood by the supervisor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    /// Open the connection unless one is already open or opening.
    Connect { identity: Option<u64> },
    /// Stop retrying and close the live connection.
    Disconnect,
}

/// Internal messages delivered to the supervisor loop.
#[derive(Debug)]
pub enum ControlMessage {
    Command(ControlCommand),
    Status { reply_tx: oneshot::Sender<StatusSnapshot> },
}

/// Client-facing handle for the control plane.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::Sender<ControlMessage>,
}

impl ControlHandle {
    pub fn new(tx: mpsc::Sender<ControlMessage>) -> Self {
        Self { tx }
    }

    /// Enqueue a command without waiting for it to be processed.
    pub fn notify(&self, command: ControlCommand) -> Result<(), ControlCallError> {
        self.tx
            .try_send(ControlMessage::Command(command))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ControlCallError::Full,
                mpsc::error::TrySendError::Closed(_) => ControlCallError::Send,
            })
    }

    /// Enqueue a command, waiting for queue space if needed.
    pub async fn send(&self, command: ControlCommand) -> Result<(), ControlCallError> {
        self.tx
            .send(ControlMessage::Command(command))
            .await
            .map_err(|_| ControlCallError::Send)
    }

    pub async fn status(&self) -> Result<StatusSnapshot, ControlCallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ControlMessage::Status { reply_tx })
            .await
            .map_err(|_| ControlCallError::Send)?;

        reply_rx.await.map_err(|_| ControlCallError::Recv)
    }
}

/// Owns the supervisor-side control receiver.
pub struct SupervisorControl {
    pub rx: mpsc::Receiver<ControlMessage>,
    pub handle: ControlHandle,
}

impl SupervisorControl {
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        Self { rx, handle: ControlHandle::new(tx) }
    }
}

/// Call-level transport errors for control requests/notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCallError {
    Send,
    Recv,
    Full,
}

impl fmt::Display for ControlCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlCallError::Send => write!(f, "control send failed: supervisor is not running"),
            ControlCallError::Recv => write!(f, "control recv failed: supervisor dropped reply sender"),
            ControlCallError::Full => write!(f, "control queue full"),
        }
    }
}

impl Error for ControlCallError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notify_after_supervisor_gone_is_send_error() {
        let control = SupervisorControl::new(4);
        let handle = control.handle.clone();
        drop(control);
        assert_eq!(handle.notify(ControlCommand::Disconnect), Err(ControlCallError::Send));
        assert_eq!(handle.status().await, Err(ControlCallError::Send));
    }

    #[test]
    fn full_queue_is_reported() {
        let control = SupervisorControl::new(1);
        control.handle.notify(ControlCommand::Disconnect).unwrap();
        assert_eq!(
            control.handle.notify(ControlCommand::Disconnect),
            Err(ControlCallError::Full)
        );
    }

    #[tokio::test]
    async fn dropped_reply_is_recv_error() {
        let mut control = SupervisorControl::new(4);
        let handle = control.handle.clone();
        let responder = tokio::spawn(async move {
            if let Some(ControlMessage::Status { reply_tx }) = control.rx.recv().await {
                drop(reply_tx);
            }
        });
        assert_eq!(handle.status().await, Err(ControlCallError::Recv));
        responder.await.unwrap();
    }

    #[test]
    fn display_messages() {
        assert!(ControlCallError::Full.to_string().contains("full"));
        assert!(ControlCallError::Send.to_string().contains("not running"));
    }
}
