//! Socket Lifecycle
//!
//! Start/stop capability shared by long-lived socket owners.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::streaming::ConnectionState;

/// Lifecycle of a long-lived socket connection.
#[async_trait]
pub trait SocketLifecycle: Send + Sync {
    /// Spawn the connection loop. Does nothing when already running.
    fn start(self: Arc<Self>);

    /// Cancel the connection loop and release the transport.
    async fn stop(&self);

    /// Current connection state.
    fn state(&self) -> ConnectionState;
}
