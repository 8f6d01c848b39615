//! Client Registry
//!
//! Owned map from transport identity to client registration. Several
//! registrations may share a client id; each transport has its own
//! connection id.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::DistributionError;

/// Client identifier chosen by the client (or assigned by the server).
pub type ClientId = u64;

/// Identity of one client transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outbound half of a client connection.
#[async_trait]
pub trait ClientTransport: Send + Sync + fmt::Debug {
    /// Whether sends can still succeed.
    fn is_open(&self) -> bool;

    /// Queue a text message.
    ///
    /// # Errors
    ///
    /// Returns `DistributionError::Closed` once the transport is closed.
    async fn send(&self, text: String) -> Result<(), DistributionError>;

    /// Close the transport. Later sends fail without effect.
    fn close(&self);
}

/// One registered client transport.
#[derive(Debug, Clone)]
pub struct ClientConnection {
    /// Transport identity.
    pub connection_id: ConnectionId,
    /// Client identifier.
    pub client_id: ClientId,
    /// Transport handle.
    pub transport: Arc<dyn ClientTransport>,
}

/// Registry of connected clients.
#[derive(Debug, Default)]
pub struct ClientRegistry {
    entries: HashMap<ConnectionId, ClientConnection>,
}

impl ClientRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration.
    pub fn insert(&mut self, connection: ClientConnection) {
        self.entries.insert(connection.connection_id, connection);
    }

    /// Remove exactly the registration for `connection_id`.
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<ClientConnection> {
        self.entries.remove(connection_id)
    }

    /// Whether `connection_id` is registered.
    #[must_use]
    pub fn contains(&self, connection_id: &ConnectionId) -> bool {
        self.entries.contains_key(connection_id)
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every registered transport.
    #[must_use]
    pub fn transports(&self) -> Vec<Arc<dyn ClientTransport>> {
        self.entries
            .values()
            .map(|c| Arc::clone(&c.transport))
            .collect()
    }

    /// Transports registered under `client_id`.
    #[must_use]
    pub fn for_client(&self, client_id: ClientId) -> Vec<Arc<dyn ClientTransport>> {
        self.entries
            .values()
            .filter(|c| c.client_id == client_id)
            .map(|c| Arc::clone(&c.transport))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    #[derive(Debug, Default)]
    struct NullTransport {
        closed: AtomicBool,
    }

    #[async_trait]
    impl ClientTransport for NullTransport {
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        async fn send(&self, _text: String) -> Result<(), DistributionError> {
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn connection(client_id: ClientId) -> ClientConnection {
        ClientConnection {
            connection_id: ConnectionId::new(),
            client_id,
            transport: Arc::new(NullTransport::default()),
        }
    }

    #[test]
    fn remove_only_touches_one_registration() {
        let mut registry = ClientRegistry::new();
        let first = connection(7);
        let second = connection(7);
        let first_id = first.connection_id;
        let second_id = second.connection_id;
        registry.insert(first);
        registry.insert(second);

        assert!(registry.remove(&first_id).is_some());
        assert!(registry.remove(&first_id).is_none());
        assert!(registry.contains(&second_id));
        assert_eq!(registry.for_client(7).len(), 1);
    }

    #[test]
    fn for_client_filters_by_id() {
        let mut registry = ClientRegistry::new();
        registry.insert(connection(1));
        registry.insert(connection(2));
        registry.insert(connection(2));

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.for_client(2).len(), 2);
        assert_eq!(registry.for_client(1).len(), 1);
        assert!(registry.for_client(3).is_empty());
        assert_eq!(registry.transports().len(), 3);
    }
}
