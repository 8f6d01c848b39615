//! Market Data Streaming Types
//!
//! Canonical events produced by the normalizer, the identities of the
//! exchanges we ingest from, and the lifecycle states of their connections.
//! These types are wire-agnostic.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Exchange
// =============================================================================

/// Exchange a stream originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    /// Binance combined streams.
    Binance,
    /// HitBTC JSON-RPC streams.
    HitBtc,
}

impl Exchange {
    /// Lowercase exchange name used in logs, metrics and payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::HitBtc => "hitbtc",
        }
    }

    /// Parse an exchange name, ignoring case.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "binance" => Some(Self::Binance),
            "hitbtc" => Some(Self::HitBtc),
            _ => None,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Lifecycle state of an exchange connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport and no connection loop running.
    #[default]
    Disconnected,
    /// Dialing a fresh transport.
    Connecting,
    /// Transport open and frames are being handled.
    Connected,
    /// Previous transport failed and has been discarded.
    Reconnecting,
}

impl ConnectionState {
    /// State name as reported by the health endpoint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

// =============================================================================
// Canonical Event
// =============================================================================

/// An exchange message rewritten into canonical field names.
///
/// The payload shape is fully determined by the field mapping that produced
/// it. Events are created per inbound frame and not retained.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalEvent {
    /// Source exchange.
    pub exchange: Exchange,
    /// Event type discriminator (also the bus channel name).
    pub event_type: String,
    /// Canonical payload.
    pub payload: Map<String, Value>,
}

impl CanonicalEvent {
    /// Create a new canonical event.
    #[must_use]
    pub fn new(exchange: Exchange, event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            exchange,
            event_type: event_type.into(),
            payload,
        }
    }

    /// Look up a canonical field as a string, accepting numeric values too.
    #[must_use]
    pub fn field_str(&self, name: &str) -> Option<String> {
        match self.payload.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn exchange_parsing() {
        assert_eq!(
            Exchange::from_str_case_insensitive("Binance"),
            Some(Exchange::Binance)
        );
        assert_eq!(
            Exchange::from_str_case_insensitive(" HITBTC "),
            Some(Exchange::HitBtc)
        );
        assert_eq!(Exchange::from_str_case_insensitive("kraken"), None);
    }

    #[test]
    fn canonical_event_serializes_camel_case() {
        let mut payload = Map::new();
        payload.insert("bestBidPrice".to_string(), json!("0.031"));
        let event = CanonicalEvent::new(Exchange::Binance, "24hrTicker", payload);

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["exchange"], "binance");
        assert_eq!(value["eventType"], "24hrTicker");
        assert_eq!(value["payload"]["bestBidPrice"], "0.031");
    }

    #[test]
    fn field_str_accepts_numbers() {
        let mut payload = Map::new();
        payload.insert("bid".to_string(), json!(1.5));
        payload.insert("flag".to_string(), json!(true));
        let event = CanonicalEvent::new(Exchange::HitBtc, "ticker", payload);

        assert_eq!(event.field_str("bid").as_deref(), Some("1.5"));
        assert_eq!(event.field_str("flag"), None);
        assert_eq!(event.field_str("missing"), None);
    }

    #[test]
    fn connection_state_default_is_disconnected() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Reconnecting.as_str(), "reconnecting");
    }
}
