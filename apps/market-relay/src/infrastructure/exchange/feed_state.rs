//! Feed State
//!
//! Shared, lock-light view of one connector's health: current state,
//! counters and the last transport error. Read by the health server.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::streaming::{ConnectionState, Exchange};

/// Live state of one exchange feed.
#[derive(Debug)]
pub struct FeedState {
    exchange: Exchange,
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    generation: AtomicU64,
    reconnects: AtomicU64,
    messages_received: AtomicU64,
    events_published: AtomicU64,
    parse_errors: AtomicU64,
}

impl FeedState {
    /// Fresh, disconnected feed.
    #[must_use]
    pub const fn new(exchange: Exchange) -> Self {
        Self {
            exchange,
            state: RwLock::new(ConnectionState::Disconnected),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            generation: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            parse_errors: AtomicU64::new(0),
        }
    }

    /// Exchange this feed belongs to.
    #[must_use]
    pub const fn exchange(&self) -> Exchange {
        self.exchange
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Record a transport failure.
    pub fn record_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    /// Start a new transport generation, returning its number.
    pub fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Generation of the most recent transport.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }

    /// Count a reconnect.
    pub fn increment_reconnects(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an inbound text frame.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a published canonical event.
    pub fn increment_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a frame that failed to decode.
    pub fn increment_parse_errors(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy for reporting.
    #[must_use]
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            exchange: self.exchange,
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            generation: self.generation(),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of a [`FeedState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedSnapshot {
    /// Exchange name.
    pub exchange: Exchange,
    /// Connection state.
    pub state: ConnectionState,
    /// Last successful connection time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last transport error since the last successful connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Transports dialed so far.
    pub generation: u64,
    /// Reconnects so far.
    pub reconnects: u64,
    /// Text frames received.
    pub messages_received: u64,
    /// Canonical events published.
    pub events_published: u64,
    /// Frames dropped as undecodable.
    pub parse_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connected_clears_last_error() {
        let state = FeedState::new(Exchange::Binance);
        state.record_error("socket error: reset".to_string());
        assert_eq!(
            state.snapshot().last_error.as_deref(),
            Some("socket error: reset")
        );

        state.set_state(ConnectionState::Connected);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.state, ConnectionState::Connected);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_connected_at.is_some());
    }

    #[test]
    fn generations_increase() {
        let state = FeedState::new(Exchange::HitBtc);
        assert_eq!(state.generation(), 0);
        assert_eq!(state.next_generation(), 1);
        assert_eq!(state.next_generation(), 2);
        assert_eq!(state.generation(), 2);
    }

    #[test]
    fn counters_show_in_snapshot() {
        let state = FeedState::new(Exchange::Binance);
        state.increment_messages();
        state.increment_messages();
        state.increment_parse_errors();
        state.increment_published();
        state.increment_reconnects();

        let snapshot = state.snapshot();
        assert_eq!(snapshot.messages_received, 2);
        assert_eq!(snapshot.parse_errors, 1);
        assert_eq!(snapshot.events_published, 1);
        assert_eq!(snapshot.reconnects, 1);
    }
}
