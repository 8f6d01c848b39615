//! HitBTC JSON-RPC Streams
//!
//! # Stream URL
//!
//! `wss://api.hitbtc.com/api/2/ws`
//!
//! # Protocol
//!
//! After the socket opens, one request is sent per topic:
//!
//! ```json
//! {"method":"subscribeTicker","params":{"symbol":"ETHBTC"},"id":1}
//! ```
//!
//! Topics can be added or dropped on the open socket with the matching
//! `unsubscribe*` request.
//!
//! Notifications arrive as `{"jsonrpc":"2.0","method":"ticker","params":{...}}`.
//! Responses carry `result` (acknowledgement) or `error`
//! (`{code, message, description}`).

use std::collections::HashMap;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::{Value, json};

use super::codec::{CodecError, InboundMessage, ProtocolError, parse_object};
use super::protocol::{ExchangeProtocol, SubscriptionAction};
use crate::domain::instrument::SymbolTable;
use crate::domain::mapping::FieldMapping;
use crate::domain::streaming::Exchange;
use crate::domain::topic::{SymbolCase, Topic, TopicFormat, TopicSet};

/// Production streaming endpoint.
pub const HITBTC_STREAM_URL: &str = "wss://api.hitbtc.com/api/2/ws";

const TOPIC_FORMAT: TopicFormat = TopicFormat::new(SymbolCase::Upper, None, ",");

static MAPPINGS: LazyLock<HashMap<&'static str, FieldMapping>> = LazyLock::new(|| {
    let trades = trades_mapping();
    HashMap::from([
        ("ticker", ticker_mapping()),
        ("snapshotTrades", trades.clone()),
        ("updateTrades", trades),
    ])
});

fn ticker_mapping() -> FieldMapping {
    FieldMapping::builder()
        .leaves(&[
            ("ask", "ask"),
            ("bid", "bid"),
            ("last", "last"),
            ("open", "open"),
            ("low", "low"),
            ("high", "high"),
            ("volume", "volume"),
            ("volumeQuote", "volumeQuote"),
            ("timestamp", "timestamp"),
            ("symbol", "symbol"),
        ])
        .build()
}

fn trades_mapping() -> FieldMapping {
    FieldMapping::builder()
        .leaf("symbol", "symbol")
        .group("data", "trades", |t| {
            t.leaves(&[
                ("id", "tradeId"),
                ("price", "price"),
                ("quantity", "quantity"),
                ("side", "side"),
                ("timestamp", "timestamp"),
            ])
        })
        .build()
}

/// Request method for a configured event name.
fn request_method(action: SubscriptionAction, event: &str) -> String {
    let verb = match action {
        SubscriptionAction::Subscribe => "subscribe",
        SubscriptionAction::Unsubscribe => "unsubscribe",
    };
    let mut chars = event.chars();
    chars.next().map_or_else(
        || verb.to_string(),
        |first| format!("{verb}{}{}", first.to_uppercase(), chars.as_str()),
    )
}

/// HitBTC JSON-RPC protocol.
#[derive(Debug)]
pub struct HitBtcProtocol {
    symbols: SymbolTable,
    next_request_id: AtomicI64,
}

impl Default for HitBtcProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl HitBtcProtocol {
    /// Protocol with the standard overrides (`tether` quoted as `USD`).
    #[must_use]
    pub fn new() -> Self {
        Self::with_symbols(&SymbolTable::new())
    }

    /// Standard overrides with `overrides` applied on top.
    #[must_use]
    pub fn with_symbols(overrides: &SymbolTable) -> Self {
        Self {
            symbols: SymbolTable::new().with("tether", "USD").overlay(overrides),
            next_request_id: AtomicI64::new(1),
        }
    }
}

impl ExchangeProtocol for HitBtcProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::HitBtc
    }

    fn default_url(&self) -> &'static str {
        HITBTC_STREAM_URL
    }

    fn topic_format(&self) -> TopicFormat {
        TOPIC_FORMAT
    }

    fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    fn endpoint(&self, base_url: &str, _topics: &TopicSet) -> String {
        base_url.to_string()
    }

    fn subscribe_requests(&self, topics: &TopicSet) -> Vec<String> {
        topics
            .iter()
            .map(|topic| self.live_request(topic, SubscriptionAction::Subscribe))
            .collect()
    }

    fn live_request(&self, topic: &Topic, action: SubscriptionAction) -> String {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        json!({
            "method": request_method(action, topic.event()),
            "params": {"symbol": topic.key()},
            "id": id,
        })
        .to_string()
    }

    fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let mut object = parse_object(text)?;

        if let Some(error) = object.get("error") {
            return Ok(InboundMessage::Error(ProtocolError::from_value(error)));
        }

        if let Some(method) = object.get("method").and_then(Value::as_str) {
            let event_type = method.to_string();
            let record = object
                .remove("result")
                .or_else(|| object.remove("params"))
                .unwrap_or(Value::Null);
            return Ok(InboundMessage::Event { event_type, record });
        }

        if object.contains_key("result") {
            return Ok(InboundMessage::Ack {
                id: object.get("id").and_then(Value::as_i64),
            });
        }

        Err(CodecError::MissingEventType)
    }

    fn mapping(&self, event_type: &str) -> Option<&'static FieldMapping> {
        MAPPINGS.get(event_type)
    }
}
