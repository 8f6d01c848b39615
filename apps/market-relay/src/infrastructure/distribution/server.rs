//! Distribution Server Implementation

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_util::sync::CancellationToken;

use super::DistributionError;
use super::envelope::{ClientEnvelope, ClientRequest, OutboundEnvelope};
use super::registry::{ClientConnection, ClientId, ClientRegistry, ClientTransport, ConnectionId};
use crate::application::services::EventBus;
use crate::domain::streaming::CanonicalEvent;
use crate::infrastructure::metrics;

/// Default per-method capacity of the inbound request bus.
const REQUEST_BUS_CAPACITY: usize = 1024;

/// Frames queued per client before sends are rejected.
const OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Time a finished session gives its writer to flush queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Delivery Report
// =============================================================================

/// Outcome of a broadcast or unicast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sends accepted by open transports.
    pub delivered: usize,
    /// Registrations skipped because their transport was closed.
    pub skipped: usize,
    /// Sends that failed while being attempted, including full client queues.
    pub failed: usize,
}

// =============================================================================
// WebSocket Transport
// =============================================================================

/// Bounded outbound queue of one accepted socket, drained by its writer task.
#[derive(Debug)]
struct WsClientTransport {
    tx: mpsc::Sender<Message>,
    open: AtomicBool,
}

impl WsClientTransport {
    const fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            tx,
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl ClientTransport for WsClientTransport {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.tx.is_closed()
    }

    async fn send(&self, text: String) -> Result<(), DistributionError> {
        if !self.is_open() {
            return Err(DistributionError::Closed);
        }
        self.tx
            .try_send(Message::Text(text.into()))
            .map_err(|e| match e {
                TrySendError::Full(_) => DistributionError::QueueFull,
                TrySendError::Closed(_) => DistributionError::Closed,
            })
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.tx.try_send(Message::Close(None));
        }
    }
}

fn client_id_from_query(query: Option<&str>) -> Option<ClientId> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("clientId="))
        .and_then(|value| value.parse().ok())
}

// =============================================================================
// Server
// =============================================================================

/// WebSocket server distributing canonical events to clients.
#[derive(Debug)]
pub struct DistributionServer {
    registry: RwLock<ClientRegistry>,
    requests: EventBus<ClientRequest>,
    next_client_id: AtomicU64,
    last_message_id: AtomicI64,
}

impl Default for DistributionServer {
    fn default() -> Self {
        Self::new()
    }
}

impl DistributionServer {
    /// Server with an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(ClientRegistry::new()),
            requests: EventBus::new(REQUEST_BUS_CAPACITY),
            next_client_id: AtomicU64::new(1),
            last_message_id: AtomicI64::new(0),
        }
    }

    /// Bus carrying client messages, keyed by `method`.
    #[must_use]
    pub const fn requests(&self) -> &EventBus<ClientRequest> {
        &self.requests
    }

    /// Number of registered transports.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Register a transport under `client_id`.
    pub fn register(&self, client_id: ClientId, transport: Arc<dyn ClientTransport>) -> ConnectionId {
        let connection_id = ConnectionId::new();
        let clients = {
            let mut registry = self.registry.write();
            registry.insert(ClientConnection {
                connection_id,
                client_id,
                transport,
            });
            registry.len()
        };
        metrics::set_clients(clients);
        tracing::info!(%connection_id, client_id, clients, "Client connected");
        connection_id
    }

    /// Remove and close exactly the registration for `connection_id`.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.registry.write().remove(connection_id);
        let Some(connection) = removed else {
            return false;
        };
        connection.transport.close();

        let clients = self.client_count();
        metrics::set_clients(clients);
        tracing::info!(
            %connection_id,
            client_id = connection.client_id,
            clients,
            "Client disconnected"
        );
        true
    }

    fn assign_client_id(&self) -> ClientId {
        self.next_client_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Millisecond timestamp, strictly greater than any id handed out before.
    fn next_message_id(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self
            .last_message_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }

    /// Send `{method, params, id}` to every open registration.
    ///
    /// Closed transports are skipped and stay registered until their
    /// session removes them.
    ///
    /// # Errors
    ///
    /// Returns `DistributionError::Serialize` if the payload cannot be encoded.
    pub async fn broadcast(
        &self,
        method: &str,
        payload: &Value,
    ) -> Result<DeliveryReport, DistributionError> {
        let text = serde_json::to_string(&OutboundEnvelope {
            method,
            params: payload,
            id: self.next_message_id(),
        })?;

        let transports = self.registry.read().transports();
        let report = deliver(transports, &text).await;
        metrics::record_broadcast(method, report.delivered, report.skipped, report.failed);
        tracing::trace!(
            method,
            delivered = report.delivered,
            skipped = report.skipped,
            failed = report.failed,
            "Broadcast"
        );
        Ok(report)
    }

    /// Send the bare payload to every open registration of `client_id`.
    ///
    /// # Errors
    ///
    /// Returns `DistributionError::Serialize` if the payload cannot be encoded.
    pub async fn unicast(
        &self,
        method: &str,
        payload: &Value,
        client_id: ClientId,
    ) -> Result<DeliveryReport, DistributionError> {
        let text = serde_json::to_string(payload)?;
        let transports = self.registry.read().for_client(client_id);
        let report = deliver(transports, &text).await;
        tracing::debug!(method, client_id, delivered = report.delivered, "Unicast");
        Ok(report)
    }

    /// Route one client text frame onto the request bus.
    ///
    /// Returns whether a request was published.
    pub fn handle_client_text(
        &self,
        connection_id: ConnectionId,
        client_id: ClientId,
        text: &str,
    ) -> bool {
        let envelope: ClientEnvelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(%connection_id, client_id, error = %e, "Dropping malformed client message");
                return false;
            }
        };

        if let Some(error) = envelope.error {
            tracing::error!(
                %connection_id,
                client_id,
                code = ?error.code,
                message = %error.message,
                description = error.description.as_deref().unwrap_or_default(),
                "Client reported an error"
            );
            return false;
        }

        let Some(method) = envelope.method.clone() else {
            tracing::warn!(%connection_id, client_id, "Dropping client message without method");
            return false;
        };

        let id = envelope.id.clone();
        self.requests.publish(
            &method,
            ClientRequest {
                connection_id,
                client_id,
                method: method.clone(),
                payload: envelope.into_payload(),
                id,
            },
        );
        true
    }

    /// Broadcast every received canonical event under its event type until
    /// cancelled or the bus closes.
    pub async fn forward(
        self: Arc<Self>,
        mut events: broadcast::Receiver<CanonicalEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        let payload = Value::Object(event.payload);
                        if let Err(e) = self.broadcast(&event.event_type, &payload).await {
                            tracing::warn!(
                                exchange = %event.exchange,
                                event_type = %event.event_type,
                                error = %e,
                                "Failed to broadcast event"
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Distribution lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Bind `port` on all interfaces and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `DistributionError::Bind` if the port cannot be bound.
    pub async fn run(
        self: Arc<Self>,
        port: u16,
        cancel: CancellationToken,
    ) -> Result<(), DistributionError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DistributionError::Bind {
                port,
                message: e.to_string(),
            })?;
        tracing::info!(%addr, "Distribution server listening");
        self.serve(listener, cancel).await;
        Ok(())
    }

    /// Accept connections on `listener` until cancelled.
    pub async fn serve(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = Arc::clone(&self);
                        let session_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            server.session(stream, peer, session_cancel).await;
                        });
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept client connection"),
                },
            }
        }
        tracing::info!("Distribution server stopped");
    }

    async fn session(self: Arc<Self>, stream: TcpStream, peer: SocketAddr, cancel: CancellationToken) {
        let mut requested_id = None;
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            requested_id = client_id_from_query(request.uri().query());
            Ok(response)
        };

        let socket = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Client handshake failed");
                return;
            }
        };
        let client_id = requested_id.unwrap_or_else(|| self.assign_client_id());

        let (mut write, mut read) = socket.split();
        let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_CAPACITY);
        let transport = Arc::new(WsClientTransport::new(tx));
        let connection_id = self.register(client_id, Arc::clone(&transport) as Arc<dyn ClientTransport>);

        let mut writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if write.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_client_text(connection_id, client_id, text.as_str());
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    // Pings are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(%connection_id, client_id, error = %e, "Client socket error");
                        break;
                    }
                },
            }
        }

        self.disconnect(&connection_id);
        drop(transport);
        if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
            tracing::warn!(%connection_id, client_id, "Client writer did not drain, aborting");
            writer.abort();
        }
    }
}

async fn deliver(transports: Vec<Arc<dyn ClientTransport>>, text: &str) -> DeliveryReport {
    let (open, closed): (Vec<_>, Vec<_>) = transports.into_iter().partition(|t| t.is_open());
    let results = join_all(open.iter().map(|t| t.send(text.to_string()))).await;
    let failed = results.iter().filter(|r| r.is_err()).count();

    DeliveryReport {
        delivered: results.len() - failed,
        skipped: closed.len(),
        failed,
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
        closed: AtomicBool,
    }

    impl RecordingTransport {
        fn closed() -> Self {
            let transport = Self::default();
            transport.closed.store(true, Ordering::SeqCst);
            transport
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().clone()
        }
    }

    #[async_trait]
    impl ClientTransport for RecordingTransport {
        fn is_open(&self) -> bool {
            !self.closed.load(Ordering::SeqCst)
        }

        async fn send(&self, text: String) -> Result<(), DistributionError> {
            if !self.is_open() {
                return Err(DistributionError::Closed);
            }
            self.sent.lock().push(text);
            Ok(())
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn broadcast_skips_closed_transports_without_removing_them() {
        let server = DistributionServer::new();
        let a = Arc::new(RecordingTransport::default());
        let b = Arc::new(RecordingTransport::default());
        let c = Arc::new(RecordingTransport::closed());
        server.register(1, a.clone());
        server.register(2, b.clone());
        server.register(3, c.clone());

        let report = server
            .broadcast("ticker", &json!({"bid": "1.5"}))
            .await
            .unwrap();

        assert_eq!(
            report,
            DeliveryReport {
                delivered: 2,
                skipped: 1,
                failed: 0
            }
        );
        assert_eq!(server.client_count(), 3);
        assert!(c.sent().is_empty());

        let message: Value = serde_json::from_str(&a.sent()[0]).unwrap();
        assert_eq!(message["method"], "ticker");
        assert_eq!(message["params"], json!({"bid": "1.5"}));
        assert!(message["id"].as_i64().unwrap() > 0);
        assert_eq!(b.sent(), a.sent());
    }

    #[tokio::test]
    async fn broadcast_ids_strictly_increase() {
        let server = DistributionServer::new();
        let transport = Arc::new(RecordingTransport::default());
        server.register(1, transport.clone());

        for _ in 0..5 {
            server.broadcast("ticker", &json!({})).await.unwrap();
        }

        let ids: Vec<i64> = transport
            .sent()
            .iter()
            .map(|text| serde_json::from_str::<Value>(text).unwrap()["id"].as_i64().unwrap())
            .collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "{ids:?}");
    }

    #[tokio::test]
    async fn broadcast_with_no_clients_is_empty() {
        let server = DistributionServer::new();
        let report = server.broadcast("ticker", &json!({})).await.unwrap();
        assert_eq!(report, DeliveryReport::default());
    }

    #[tokio::test]
    async fn unicast_sends_bare_payload_to_matching_clients() {
        let server = DistributionServer::new();
        let first = Arc::new(RecordingTransport::default());
        let second = Arc::new(RecordingTransport::default());
        let other = Arc::new(RecordingTransport::default());
        server.register(9, first.clone());
        server.register(9, second.clone());
        server.register(4, other.clone());

        let report = server
            .unicast("balance", &json!({"free": "2"}), 9)
            .await
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(first.sent(), vec![r#"{"free":"2"}"#.to_string()]);
        assert_eq!(second.sent(), first.sent());
        assert!(other.sent().is_empty());
    }

    #[tokio::test]
    async fn disconnect_removes_exactly_one_registration() {
        let server = DistributionServer::new();
        let first = Arc::new(RecordingTransport::default());
        let second = Arc::new(RecordingTransport::default());
        let first_id = server.register(5, first.clone());
        server.register(5, second.clone());

        assert!(server.disconnect(&first_id));
        assert!(!server.disconnect(&first_id));
        assert_eq!(server.client_count(), 1);
        assert!(!first.is_open());

        let report = server.unicast("m", &json!(1), 5).await.unwrap();
        assert_eq!(report.delivered, 1);
        assert!(first.sent().is_empty());
    }

    #[tokio::test]
    async fn client_messages_route_by_method() {
        let server = DistributionServer::new();
        let connection_id = ConnectionId::new();
        let mut rx = server.requests().subscribe("subscribe");

        assert!(server.handle_client_text(
            connection_id,
            7,
            r#"{"method":"subscribe","params":{"symbol":"ETHBTC"},"id":3}"#
        ));

        let request = rx.try_recv().unwrap();
        assert_eq!(request.client_id, 7);
        assert_eq!(request.connection_id, connection_id);
        assert_eq!(request.method, "subscribe");
        assert_eq!(request.payload, json!({"symbol": "ETHBTC"}));
        assert_eq!(request.id, Some(json!(3)));
    }

    #[test]
    fn client_errors_and_malformed_messages_are_not_routed() {
        let server = DistributionServer::new();
        let mut all = server.requests().subscribe_all();
        let connection_id = ConnectionId::new();

        assert!(!server.handle_client_text(connection_id, 1, "not json"));
        assert!(!server.handle_client_text(
            connection_id,
            1,
            r#"{"method":"order","error":{"message":"Insufficient funds","description":"Check balance"}}"#
        ));
        assert!(!server.handle_client_text(connection_id, 1, r#"{"params":{}}"#));

        assert!(all.try_recv().is_err());
    }

    #[tokio::test]
    async fn forward_broadcasts_events_by_type() {
        use crate::domain::streaming::Exchange;

        let server = Arc::new(DistributionServer::new());
        let transport = Arc::new(RecordingTransport::default());
        server.register(1, transport.clone());

        let bus = EventBus::<CanonicalEvent>::new(16);
        let events = bus.subscribe_all();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&server).forward(events, cancel.clone()));

        let mut payload = serde_json::Map::new();
        payload.insert("symbol".to_string(), json!("ETHBTC"));
        bus.publish("ticker", CanonicalEvent::new(Exchange::HitBtc, "ticker", payload));

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while transport.sent().is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        task.await.unwrap();

        let message: Value = serde_json::from_str(&transport.sent()[0]).unwrap();
        assert_eq!(message["method"], "ticker");
        assert_eq!(message["params"], json!({"symbol": "ETHBTC"}));
    }

    #[test]
    fn client_id_is_read_from_query() {
        assert_eq!(client_id_from_query(Some("clientId=42")), Some(42));
        assert_eq!(client_id_from_query(Some("a=1&clientId=7")), Some(7));
        assert_eq!(client_id_from_query(Some("clientId=abc")), None);
        assert_eq!(client_id_from_query(Some("a=1")), None);
        assert_eq!(client_id_from_query(None), None);
    }

    #[tokio::test]
    async fn full_ws_queue_counts_as_failed_delivery() {
        let (tx, mut rx) = mpsc::channel(2);
        let stalled: Arc<dyn ClientTransport> = Arc::new(WsClientTransport::new(tx));

        let first = deliver(vec![Arc::clone(&stalled)], "a").await;
        let second = deliver(vec![Arc::clone(&stalled)], "b").await;
        let third = deliver(vec![Arc::clone(&stalled)], "c").await;

        assert_eq!(first, DeliveryReport { delivered: 1, skipped: 0, failed: 0 });
        assert_eq!(second.delivered, 1);
        assert_eq!(third, DeliveryReport { delivered: 0, skipped: 0, failed: 1 });
        assert!(stalled.is_open());
        assert!(matches!(
            stalled.send("d".to_string()).await,
            Err(DistributionError::QueueFull)
        ));

        assert!(matches!(rx.recv().await, Some(Message::Text(text)) if text.as_str() == "a"));
        stalled.send("e".to_string()).await.unwrap();
    }

    #[tokio::test]
    async fn closed_ws_transport_rejects_sends() {
        let (tx, mut rx) = mpsc::channel(8);
        let transport = WsClientTransport::new(tx);

        transport.send("a".to_string()).await.unwrap();
        transport.close();
        transport.close();

        assert!(!transport.is_open());
        assert!(matches!(
            transport.send("b".to_string()).await,
            Err(DistributionError::Closed)
        ));
        assert!(matches!(rx.recv().await, Some(Message::Text(_))));
        assert!(matches!(rx.recv().await, Some(Message::Close(None))));
        assert!(rx.try_recv().is_err());
    }
}
