//! Binance Combined Streams
//!
//! # Stream URL
//!
//! `wss://stream.binance.com:9443/stream?streams=<topic>/<topic>/...`
//!
//! Topics are lowercase pair symbols with an `@event` suffix
//! (`ethbtc@ticker`), all requested through the URL; nothing is sent after
//! the socket opens. Topics changed on an open socket use
//! `{"method":"SUBSCRIBE","params":["ethbtc@ticker"],"id":1}` (or
//! `UNSUBSCRIBE`), answered with `{"result":null,"id":1}`.
//!
//! # Frames
//!
//! ```json
//! {"stream":"ethbtc@ticker","data":{"e":"24hrTicker","E":123456789,"s":"ETHBTC",...}}
//! ```
//!
//! The event type is `data.e`. The `stream` name is copied into the record so
//! mappings may keep it.

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

/// Production combined-stream endpoint.
pub const BINANCE_STREAM_URL: &str = "wss://stream.binance.com:9443/stream";

const TOPIC_FORMAT: TopicFormat = TopicFormat::new(SymbolCase::Lower, Some('@'), "/");

static MAPPINGS: LazyLock<HashMap<&'static str, FieldMapping>> = LazyLock::new(|| {
    HashMap::from([
        ("aggTrade", agg_trade_mapping()),
        ("trade", trade_mapping()),
        ("24hrMiniTicker", mini_ticker_mapping()),
        ("24hrTicker", ticker_mapping()),
        ("kline", kline_mapping()),
    ])
});

fn agg_trade_mapping() -> FieldMapping {
    FieldMapping::builder()
        .leaves(&[
            ("e", "eventType"),
            ("E", "eventTime"),
            ("s", "symbol"),
            ("a", "aggregateTradeId"),
            ("p", "price"),
            ("q", "quantity"),
            ("f", "firstTradeId"),
            ("l", "lastTradeId"),
            ("T", "tradeTime"),
            ("m", "isMarketMaker"),
            ("M", "ignore"),
        ])
        .build()
}

fn trade_mapping() -> FieldMapping {
    FieldMapping::builder()
        .leaves(&[
            ("e", "eventType"),
            ("E", "eventTime"),
            ("s", "symbol"),
            ("t", "tradeId"),
            ("p", "price"),
            ("q", "quantity"),
            ("b", "buyerOrderId"),
            ("a", "sellerOrderId"),
            ("T", "tradeTime"),
            ("m", "isMarketMaker"),
            ("M", "ignore"),
        ])
        .build()
}

fn mini_ticker_mapping() -> FieldMapping {
    FieldMapping::builder()
        .leaves(&[
            ("e", "eventType"),
            ("E", "eventTime"),
            ("s", "symbol"),
            ("c", "currentDayClosePrice"),
            ("o", "openPrice"),
            ("h", "highPrice"),
            ("l", "lowPrice"),
            ("v", "totalTradedBaseAssetVolume"),
            ("q", "totalTradedQuoteAssetVolume"),
        ])
        .build()
}

fn ticker_mapping() -> FieldMapping {
    FieldMapping::builder()
        .leaves(&[
            ("e", "eventType"),
            ("E", "eventTime"),
            ("s", "symbol"),
            ("p", "priceChange"),
            ("P", "priceChangePercent"),
            ("w", "weightedAveragePrice"),
            ("x", "previousDayClosePrice"),
            ("c", "currentDayClosePrice"),
            ("Q", "closeTradeQuantity"),
            ("b", "bestBidPrice"),
            ("B", "bestBidQuantity"),
            ("a", "bestAskPrice"),
            ("A", "bestAskQuantity"),
            ("o", "open"),
            ("h", "high"),
            ("l", "low"),
            ("v", "totalTradedBaseAssetVolume"),
            ("q", "totalTradedQuoteAssetVolume"),
            ("O", "statisticsOpenTime"),
            ("C", "statisticsCloseTime"),
            ("F", "firstTradeId"),
            ("L", "lastTradeId"),
            ("n", "totalNumberOfTrades"),
        ])
        .build()
}

fn kline_mapping() -> FieldMapping {
    FieldMapping::builder()
        .leaves(&[
            ("stream", "stream"),
            ("e", "eventType"),
            ("E", "eventTime"),
            ("s", "symbol"),
        ])
        .group("k", "kline", |k| {
            k.leaves(&[
                ("t", "klineStartTime"),
                ("T", "klineCloseTime"),
                ("s", "symbol"),
                ("i", "interval"),
                ("f", "firstTradeId"),
                ("L", "lastTradeId"),
                ("o", "open"),
                ("c", "close"),
                ("h", "high"),
                ("l", "low"),
                ("v", "baseAssetVolume"),
                ("n", "numberOfTrades"),
                ("x", "isKlineClosed"),
                ("q", "quoteAssetVolume"),
                ("V", "takerBuyBaseAssetVolume"),
                ("Q", "takerBuyQuoteAssetVolume"),
                ("B", "ignore"),
            ])
        })
        .build()
}

/// Binance combined-stream protocol.
#[derive(Debug)]
pub struct BinanceProtocol {
    symbols: SymbolTable,
    next_request_id: AtomicI64,
}

impl Default for BinanceProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceProtocol {
    /// Protocol with no symbol overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::with_symbols(&SymbolTable::new())
    }

    /// Protocol with configured symbol overrides.
    #[must_use]
    pub fn with_symbols(overrides: &SymbolTable) -> Self {
        Self {
            symbols: overrides.clone(),
            next_request_id: AtomicI64::new(1),
        }
    }
}

impl ExchangeProtocol for BinanceProtocol {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn default_url(&self) -> &'static str {
        BINANCE_STREAM_URL
    }

    fn topic_format(&self) -> TopicFormat {
        TOPIC_FORMAT
    }

    fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    fn endpoint(&self, base_url: &str, topics: &TopicSet) -> String {
        let base = base_url.trim_end_matches(['?', '/']);
        format!("{base}?streams={}", topics.join())
    }

    fn subscribe_requests(&self, _topics: &TopicSet) -> Vec<String> {
        Vec::new()
    }

    fn live_request(&self, topic: &Topic, action: SubscriptionAction) -> String {
        let method = match action {
            SubscriptionAction::Subscribe => "SUBSCRIBE",
            SubscriptionAction::Unsubscribe => "UNSUBSCRIBE",
        };
        json!({
            "method": method,
            "params": [topic.key()],
            "id": self.next_request_id.fetch_add(1, Ordering::Relaxed),
        })
        .to_string()
    }

    fn decode(&self, text: &str) -> Result<InboundMessage, CodecError> {
        let mut object = parse_object(text)?;

        if let Some(data) = object.remove("data") {
            let Value::Object(mut record) = data else {
                return Err(CodecError::InvalidFormat(
                    "stream data is not an object".to_string(),
                ));
            };
            let event_type = record
                .get("e")
                .and_then(Value::as_str)
                .ok_or(CodecError::MissingEventType)?
                .to_string();
            if let Some(stream) = object.remove("stream") {
                record.insert("stream".to_string(), stream);
            }
            return Ok(InboundMessage::Event {
                event_type,
                record: Value::Object(record),
            });
        }

        if let Some(error) = object.get("error") {
            return Ok(InboundMessage::Error(ProtocolError::from_value(error)));
        }

        if object.contains_key("result") {
            return Ok(InboundMessage::Ack {
                id: object.get("id").and_then(Value::as_i64),
            });
        }

        if object.contains_key("code") && object.contains_key("msg") {
            return Ok(InboundMessage::Error(ProtocolError::from_value(
                &Value::Object(object),
            )));
        }

        // Raw single-stream endpoint: the event object itself.
        if let Some(event_type) = object.get("e").and_then(Value::as_str) {
            return Ok(InboundMessage::Event {
                event_type: event_type.to_string(),
                record: Value::Object(object),
            });
        }

        Err(CodecError::InvalidFormat(
            "frame has neither data, result nor error".to_string(),
        ))
    }

    fn mapping(&self, event_type: &str) -> Option<&'static FieldMapping> {
        MAPPINGS.get(event_type)
    }
}
