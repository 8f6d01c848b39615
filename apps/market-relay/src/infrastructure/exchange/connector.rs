//! Exchange Connector
//!
//! Owns one exchange's streaming connection and publishes the canonical
//! events it produces on a local [`EventBus`].
//!
//! # State Machine
//!
//! ```text
//! Disconnected --start--> Connecting --dial ok--> Connected
//!                              ^                      |
//!                              |   error / close      |
//!                              +---- Reconnecting <---+
//! ```
//!
//! Every reconnect dials a fresh transport; the previous one is dropped
//! before the next dial. Reconnection never gives up.
//!
//! # Runtime Subscriptions
//!
//! [`ExchangeConnector::subscribe_topics`] and
//! [`ExchangeConnector::unsubscribe_topics`] edit the active topic set. While
//! a transport is open the protocol's request frame goes out on it; every
//! later connection starts from the edited set.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::codec::InboundMessage;
use super::feed_state::FeedState;
use super::protocol::{ExchangeProtocol, SubscriptionAction};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::{Dialer, Frame, SocketLifecycle, TransportError};
use crate::application::services::EventBus;
use crate::domain::instrument::Currency;
use crate::domain::streaming::{CanonicalEvent, ConnectionState, Exchange};
use crate::domain::topic::{TopicError, TopicSet};
use crate::infrastructure::metrics;

// =============================================================================
// Error Type
// =============================================================================

/// Reasons a connection ends.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// Transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Exchange sent a close frame.
    #[error("connection closed by exchange: {}", .0.as_deref().unwrap_or("no reason"))]
    ClosedByPeer(Option<String>),
}

// =============================================================================
// Configuration
// =============================================================================

/// Connector configuration.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Base streaming URL; the protocol appends topics if it needs to.
    pub url: String,
    /// Delay policy between reconnects.
    pub reconnect: ReconnectConfig,
    /// Start on the first subscription instead of on an explicit `start`.
    pub lazy_start: bool,
    /// Per-channel event buffer.
    pub bus_capacity: usize,
}

impl ConnectorConfig {
    /// Eager connector with immediate reconnects.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::immediate(),
            lazy_start: false,
            bus_capacity: 4096,
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

struct RunningTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Streaming connection to one exchange.
pub struct ExchangeConnector {
    protocol: Arc<dyn ExchangeProtocol>,
    dialer: Arc<dyn Dialer>,
    config: ConnectorConfig,
    topics: RwLock<TopicSet>,
    /// Request queue of the current transport, if one is being dialed or open.
    live: Mutex<Option<mpsc::UnboundedSender<String>>>,
    bus: EventBus<CanonicalEvent>,
    state_tx: watch::Sender<ConnectionState>,
    feed: Arc<FeedState>,
    running: Mutex<Option<RunningTask>>,
}

impl std::fmt::Debug for ExchangeConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeConnector")
            .field("exchange", &self.exchange())
            .field("url", &self.config.url)
            .field("topics", &self.topics.read().len())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ExchangeConnector {
    /// Create a stopped connector for `topics`.
    #[must_use]
    pub fn new(
        protocol: Arc<dyn ExchangeProtocol>,
        dialer: Arc<dyn Dialer>,
        topics: TopicSet,
        config: ConnectorConfig,
    ) -> Self {
        let feed = Arc::new(FeedState::new(protocol.exchange()));
        Self {
            bus: EventBus::new(config.bus_capacity),
            state_tx: watch::channel(ConnectionState::Disconnected).0,
            running: Mutex::new(None),
            protocol,
            dialer,
            config,
            topics: RwLock::new(topics),
            live: Mutex::new(None),
            feed,
        }
    }

    /// Exchange this connector streams from.
    #[must_use]
    pub fn exchange(&self) -> Exchange {
        self.protocol.exchange()
    }

    /// Snapshot of the active topics.
    #[must_use]
    pub fn topics(&self) -> TopicSet {
        self.topics.read().clone()
    }

    /// Topics for every product/base pair and event, spelled for this
    /// exchange.
    ///
    /// # Errors
    ///
    /// Returns `TopicError::UnknownCurrency` if a currency has no symbol.
    pub fn build_topics(
        &self,
        products: &[Currency],
        bases: &[Currency],
        events: &[String],
    ) -> Result<TopicSet, TopicError> {
        self.protocol.build_topics(products, bases, events)
    }

    /// Add `topics` to the active set. Returns how many were new.
    pub fn subscribe_topics(&self, topics: &TopicSet) -> usize {
        self.change_topics(topics, SubscriptionAction::Subscribe)
    }

    /// Remove `topics` from the active set. Returns how many were present.
    pub fn unsubscribe_topics(&self, topics: &TopicSet) -> usize {
        self.change_topics(topics, SubscriptionAction::Unsubscribe)
    }

    fn change_topics(&self, topics: &TopicSet, action: SubscriptionAction) -> usize {
        let exchange = self.exchange();
        let mut active = self.topics.write();
        let live = self.live.lock();
        let mut changed = 0;

        for topic in topics {
            let applied = match action {
                SubscriptionAction::Subscribe => active.insert(topic.clone()),
                SubscriptionAction::Unsubscribe => active.remove(topic),
            };
            if !applied {
                continue;
            }
            changed += 1;
            if let Some(tx) = live.as_ref() {
                let _ = tx.send(self.protocol.live_request(topic, action));
            }
            tracing::info!(exchange = %exchange, topic = %topic, action = ?action, "Topic changed");
        }

        changed
    }

    /// Local bus carrying this connector's canonical events.
    #[must_use]
    pub const fn bus(&self) -> &EventBus<CanonicalEvent> {
        &self.bus
    }

    /// Shared feed state for health reporting.
    #[must_use]
    pub fn feed_state(&self) -> Arc<FeedState> {
        Arc::clone(&self.feed)
    }

    /// Observe state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Whether the connection loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Receive events of `event_type`. Starts a lazy connector.
    pub fn subscribe(self: &Arc<Self>, event_type: &str) -> broadcast::Receiver<CanonicalEvent> {
        let rx = self.bus.subscribe(event_type);
        self.start_if_lazy();
        rx
    }

    /// Receive every event. Starts a lazy connector.
    pub fn subscribe_all(self: &Arc<Self>) -> broadcast::Receiver<CanonicalEvent> {
        let rx = self.bus.subscribe_all();
        self.start_if_lazy();
        rx
    }

    fn start_if_lazy(self: &Arc<Self>) {
        if self.config.lazy_start {
            Arc::clone(self).start();
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
        self.feed.set_state(state);
        metrics::set_connection_state(self.exchange(), state);
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let exchange = self.exchange();
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            self.set_state(ConnectionState::Connecting);

            let outcome = self.connect_and_run(&cancel, &mut policy).await;
            self.live.lock().take();

            match outcome {
                Ok(()) => break,
                Err(e) => {
                    tracing::warn!(exchange = %exchange, error = %e, "Exchange connection lost");
                    self.feed.record_error(e.to_string());
                    self.feed.increment_reconnects();
                    self.set_state(ConnectionState::Reconnecting);
                    metrics::record_reconnect(exchange);

                    let delay = policy.next_delay();
                    tracing::info!(
                        exchange = %exchange,
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to exchange"
                    );

                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                        if cancel.is_cancelled() {
                            break;
                        }
                    } else {
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!(exchange = %exchange, "Exchange connector stopped");
    }

    /// Dial, subscribe and pump frames until cancelled (`Ok`) or failed.
    async fn connect_and_run(
        &self,
        cancel: &CancellationToken,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), ConnectorError> {
        let exchange = self.exchange();
        let generation = self.feed.next_generation();

        // Changes made after this snapshot are queued on `requests`.
        let (url, subscribe_requests, topic_count, mut requests) = {
            let topics = self.topics.read();
            let (tx, rx) = mpsc::unbounded_channel();
            *self.live.lock() = Some(tx);
            (
                self.protocol.endpoint(&self.config.url, &topics),
                self.protocol.subscribe_requests(&topics),
                topics.len(),
                rx,
            )
        };
        tracing::info!(exchange = %exchange, url = %url, generation, "Connecting to exchange");

        let (mut sink, mut stream) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            dialed = self.dialer.dial(&url) => dialed?,
        };

        self.set_state(ConnectionState::Connected);
        policy.reset();
        tracing::info!(exchange = %exchange, generation, topics = topic_count, "Exchange connected");

        for request in subscribe_requests {
            sink.send(Frame::Text(request)).await?;
        }

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = sink.send(Frame::Close(None)).await;
                    return Ok(());
                }
                Some(request) = requests.recv() => sink.send(Frame::Text(request)).await?,
                frame = stream.next() => match frame {
                    Some(Ok(Frame::Text(text))) => self.handle_text(&text),
                    Some(Ok(Frame::Ping(data))) => sink.send(Frame::Pong(data)).await?,
                    Some(Ok(Frame::Close(reason))) => {
                        return Err(ConnectorError::ClosedByPeer(reason));
                    }
                    Some(Ok(Frame::Binary(_) | Frame::Pong(_))) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(TransportError::Closed.into()),
                },
            }
        }
    }

    /// Decode, normalize and publish one text frame.
    fn handle_text(&self, text: &str) {
        let exchange = self.exchange();
        self.feed.increment_messages();
        metrics::record_frame_received(exchange);

        match self.protocol.decode(text) {
            Err(e) => {
                tracing::warn!(exchange = %exchange, error = %e, "Dropping undecodable frame");
                self.feed.increment_parse_errors();
                metrics::record_parse_error(exchange);
            }
            Ok(InboundMessage::Error(error)) => {
                tracing::error!(
                    exchange = %exchange,
                    code = ?error.code,
                    message = %error.message,
                    description = error.description.as_deref().unwrap_or_default(),
                    "Exchange reported an error"
                );
                metrics::record_protocol_error(exchange);
            }
            Ok(InboundMessage::Ack { id }) => {
                tracing::debug!(exchange = %exchange, id = ?id, "Request acknowledged");
            }
            Ok(InboundMessage::Event { event_type, record }) => {
                let Some(mapping) = self.protocol.mapping(&event_type) else {
                    tracing::debug!(exchange = %exchange, event_type = %event_type, "No mapping for event type");
                    metrics::record_event_unmapped(exchange, &event_type);
                    return;
                };

                let payload = mapping.apply(record);
                metrics::record_event_published(exchange, &event_type);
                self.feed.increment_published();
                let channel = event_type.clone();
                self.bus
                    .publish(&channel, CanonicalEvent::new(exchange, event_type, payload));
            }
        }
    }
}

#[async_trait]
impl SocketLifecycle for ExchangeConnector {
    fn start(self: Arc<Self>) {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|task| !task.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&self).run(cancel.clone()));
        *running = Some(RunningTask { cancel, handle });
        tracing::debug!(exchange = %self.exchange(), "Exchange connector started");
    }

    async fn stop(&self) {
        let task = self.running.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                tracing::error!(exchange = %self.exchange(), error = %e, "Connector task failed");
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }
}
