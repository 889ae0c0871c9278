//! Connection primitive — the seam between the supervisor and the wire.
//!
//! The supervisor only needs three things from a transport: open a
//! connection to a URL, read the next inbound frame, and close. [`Connector`]
//! and [`Connection`] capture exactly that with boxed futures so both can be
//! used as trait objects.
//!
//! Two implementations ship with the crate:
//! - [`ws::WsConnector`] — WebSocket client over `tokio-tungstenite`.
//! - [`memory::MemoryConnector`] — in-process channel pair, driven by a
//!   [`memory::MemoryServer`]; used by tests and local tooling.

pub mod memory;
pub mod ws;

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    /// The target address could not be built.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),

    /// The connection could not be opened (refused, handshake failed, …).
    #[error("connect failed: {0}")]
    Connect(String),

    /// A read failed on an open connection.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("connection closed")]
    Closed,
}

/// One inbound frame. Control frames never surface here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

pub type ConnectFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, TransportError>> + Send + 'static>>;
pub type RecvFuture<'a> =
    Pin<Box<dyn Future<Output = Option<Result<Frame, TransportError>>> + Send + 'a>>;
pub type CloseFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Opens connections. Shared by the supervisor for its whole lifetime.
pub trait Connector: Send + Sync + 'static {
    /// Start opening a connection to `url`.
    ///
    /// The returned future resolves once the connection is usable. Dropping
    /// it abandons the attempt.
    fn connect(&self, url: &Url) -> ConnectFuture;
}

/// A live connection owned by the supervisor.
pub trait Connection: Send + 'static {
    /// Next inbound frame.
    ///
    /// `None` means the connection has ended (close frame, EOF, or after a
    /// read error has been reported). Must be cancel-safe: the supervisor
    /// polls it inside `select!`.
    fn recv(&mut self) -> RecvFuture<'_>;

    /// Close from this side. Errors are logged by the implementation.
    fn close(&mut self) -> CloseFuture<'_>;
}
