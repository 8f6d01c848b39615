//! Transport Port (Driven Port)
//!
//! Frame-level view of a bidirectional socket. Connectors only see
//! [`Frame`]s so the WebSocket implementation can be swapped for a scripted
//! one in tests.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Sink, Stream};

/// A single transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
    /// Ping with payload.
    Ping(Vec<u8>),
    /// Pong with payload.
    Pong(Vec<u8>),
    /// Close frame, with optional reason.
    Close(Option<String>),
}

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Transport could not be opened.
    #[error("failed to open transport: {0}")]
    OpenFailed(String),

    /// Peer answered the upgrade with an unexpected HTTP status.
    #[error("unexpected response status {0}")]
    UnexpectedResponse(u16),

    /// Socket failed while open.
    #[error("socket error: {0}")]
    Socket(String),

    /// Transport is closed.
    #[error("transport closed")]
    Closed,
}

/// Outbound half of a transport.
pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = TransportError> + Send>>;

/// Inbound half of a transport.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, TransportError>> + Send>>;

/// Opens transports.
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a fresh transport to `url`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the transport cannot be opened.
    async fn dial(&self, url: &str) -> Result<(FrameSink, FrameStream), TransportError>;
}
