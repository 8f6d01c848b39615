//! Distribution Server
//!
//! WebSocket endpoint that republishes canonical events to downstream
//! clients and routes client messages onto a local request bus.
//!
//! # Architecture
//!
//! Each accepted socket becomes one registration in the [`ClientRegistry`]:
//!
//! 1. The handshake reads the optional `clientId` query parameter
//! 2. A writer task drains the client's outbound queue into the socket
//! 3. The reader routes inbound envelopes by `method`
//! 4. On close or error exactly that registration is removed

pub mod envelope;
pub mod registry;
pub mod server;

pub use envelope::{ClientEnvelope, ClientRequest, OutboundEnvelope, RpcError};
pub use registry::{ClientConnection, ClientId, ClientRegistry, ClientTransport, ConnectionId};
pub use server::{DeliveryReport, DistributionServer};

/// Errors raised by the distribution server.
#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    /// Listening socket could not be bound.
    #[error("failed to bind distribution port {port}: {message}")]
    Bind {
        /// Requested port.
        port: u16,
        /// Underlying error.
        message: String,
    },

    /// Client transport is closed.
    #[error("client transport closed")]
    Closed,

    /// Client outbound queue is full.
    #[error("client outbound queue full")]
    QueueFull,

    /// Envelope could not be serialized.
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}
