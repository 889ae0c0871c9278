//! Quadrant Live — real-time client for the quadrant task board.
//!
//! One supervised push connection per process ([`supervisor`]), decoded
//! envelopes fanned out by message type ([`router`]), plus the REST client
//! ([`api`]) and an optional same-origin reverse proxy ([`proxy`]).

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod logger;
#[cfg(feature = "proxy")]
pub mod proxy;
pub mod router;
pub mod supervisor;
pub mod transport;

pub use client::{ClientHandle, ClientSettings, RealtimeClient};
pub use envelope::Envelope;
pub use error::AppError;
pub use router::{DispatchReport, Listener, ListenerError, ListenerResult, Router};
pub use supervisor::status::{ConnectionState, StatusSnapshot};
