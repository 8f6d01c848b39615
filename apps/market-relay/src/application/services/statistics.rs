//! Statistic Collector
//!
//! Keeps the latest best bid/ask per product and exchange from canonical
//! ticker events, and periodically hands snapshots to a [`StatisticSink`].
//! Only instruments quoted in the configured base currency are tracked.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::application::ports::StatisticSink;
use crate::domain::instrument::Currency;
use crate::domain::statistic::{ExchangeQuote, StatisticRecord};
use crate::domain::streaming::{CanonicalEvent, Exchange};
use crate::domain::topic::TopicSet;

/// Canonical ticker fields carrying best bid and ask.
struct QuoteFields {
    event_type: &'static str,
    bid: &'static str,
    ask: &'static str,
}

/// Flush period used when a zero interval is requested.
pub const MIN_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

const fn quote_fields(exchange: Exchange) -> QuoteFields {
    match exchange {
        Exchange::Binance => QuoteFields {
            event_type: "24hrTicker",
            bid: "bestBidPrice",
            ask: "bestAskPrice",
        },
        Exchange::HitBtc => QuoteFields {
            event_type: "ticker",
            bid: "bid",
            ask: "ask",
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Quote {
    bid: Decimal,
    ask: Decimal,
}

/// Tracks best quotes and snapshots them into statistic records.
#[derive(Debug)]
pub struct StatisticCollector {
    quote_base: Currency,
    topics: HashMap<Exchange, TopicSet>,
    quotes: RwLock<BTreeMap<Currency, BTreeMap<&'static str, Quote>>>,
}

impl StatisticCollector {
    /// Create a collector for products quoted in `quote_base`.
    ///
    /// `topics` resolve exchange pair symbols back to instruments.
    #[must_use]
    pub fn new(quote_base: Currency, topics: HashMap<Exchange, TopicSet>) -> Self {
        Self {
            quote_base,
            topics,
            quotes: RwLock::new(BTreeMap::new()),
        }
    }

    /// Update quotes from a canonical event.
    ///
    /// Returns `true` when the event changed a tracked quote. Non-ticker
    /// events, unknown symbols and non-decimal prices are ignored.
    pub fn observe(&self, event: &CanonicalEvent) -> bool {
        let fields = quote_fields(event.exchange);
        if event.event_type != fields.event_type {
            return false;
        }

        let Some(symbol) = event.field_str("symbol") else {
            return false;
        };
        let Some(instrument) = self
            .topics
            .get(&event.exchange)
            .and_then(|topics| topics.instrument_for_symbol(&symbol))
        else {
            return false;
        };
        if instrument.base != self.quote_base {
            return false;
        }

        let (Some(bid), Some(ask)) = (
            parse_decimal(event.field_str(fields.bid)),
            parse_decimal(event.field_str(fields.ask)),
        ) else {
            tracing::debug!(
                exchange = %event.exchange,
                symbol = %symbol,
                "Ticker without decimal bid/ask ignored"
            );
            return false;
        };

        self.quotes
            .write()
            .entry(instrument.product.clone())
            .or_default()
            .insert(event.exchange.as_str(), Quote { bid, ask });
        true
    }

    /// Current record for `product`, if any exchange has quoted it.
    #[must_use]
    pub fn snapshot(&self, product: &Currency) -> Option<StatisticRecord> {
        let quotes = self.quotes.read();
        let by_exchange = quotes.get(product)?;
        Some(to_record(product, by_exchange))
    }

    /// Records for every quoted product.
    #[must_use]
    pub fn snapshots(&self) -> Vec<StatisticRecord> {
        self.quotes
            .read()
            .iter()
            .map(|(product, by_exchange)| to_record(product, by_exchange))
            .collect()
    }

    /// Store every snapshot in `sink`.
    ///
    /// Failures are logged and skipped. Returns how many records were stored.
    pub async fn flush(&self, sink: &dyn StatisticSink) -> usize {
        let mut stored = 0;
        for record in self.snapshots() {
            let product = record.product.clone();
            match sink.store(record).await {
                Ok(()) => stored += 1,
                Err(e) => {
                    tracing::warn!(product = %product, error = %e, "Failed to store statistic");
                }
            }
        }
        stored
    }

    /// Observe events from one bus until cancelled or the bus closes.
    pub async fn observe_events(
        self: Arc<Self>,
        mut events: broadcast::Receiver<CanonicalEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => {
                        self.observe(&event);
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Statistic collector lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    /// Flush to `sink` on every `interval` tick until cancelled.
    ///
    /// A zero interval falls back to [`MIN_FLUSH_INTERVAL`].
    pub async fn flush_every(
        self: Arc<Self>,
        sink: Arc<dyn StatisticSink>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        if interval.is_zero() {
            tracing::warn!(
                min_ms = MIN_FLUSH_INTERVAL.as_millis(),
                "Zero statistic interval, using minimum"
            );
        }
        let interval = if interval.is_zero() {
            MIN_FLUSH_INTERVAL
        } else {
            interval
        };
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let stored = self.flush(sink.as_ref()).await;
                    tracing::debug!(stored, "Statistics flushed");
                }
            }
        }

        tracing::info!("Statistic collector stopped");
    }
}

fn to_record(product: &Currency, by_exchange: &BTreeMap<&'static str, Quote>) -> StatisticRecord {
    let exchanges = by_exchange
        .iter()
        .map(|(title, quote)| ExchangeQuote {
            title: (*title).to_string(),
            bid: quote.bid,
            ask: quote.ask,
        })
        .collect();
    StatisticRecord::now(product.clone(), exchanges)
}

fn parse_decimal(raw: Option<String>) -> Option<Decimal> {
    raw.and_then(|s| Decimal::from_str(s.trim()).ok())
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::*;
    use crate::application::ports::{MockStatisticSink, SinkError};
    use crate::domain::instrument::{SymbolResolver, SymbolTable};
    use crate::domain::topic::{SymbolCase, TopicBuilder, TopicFormat};

    fn topics() -> HashMap<Exchange, TopicSet> {
        let products = vec![Currency::new("bitcoin"), Currency::new("ethereum")];
        let bases = vec![Currency::new("bitcoin"), Currency::new("tether")];

        let binance_table = SymbolTable::new();
        let binance = TopicBuilder::new(
            SymbolResolver::new(&binance_table),
            TopicFormat::new(SymbolCase::Lower, Some('@'), "/"),
        )
        .build(&products, &bases, "ticker")
        .unwrap();

        let hitbtc_table = SymbolTable::new().with("tether", "USD");
        let hitbtc = TopicBuilder::new(
            SymbolResolver::new(&hitbtc_table),
            TopicFormat::new(SymbolCase::Upper, None, ""),
        )
        .build(&products, &bases, "ticker")
        .unwrap();

        HashMap::from([(Exchange::Binance, binance), (Exchange::HitBtc, hitbtc)])
    }

    fn collector() -> StatisticCollector {
        StatisticCollector::new(Currency::new("tether"), topics())
    }

    fn event(exchange: Exchange, event_type: &str, payload: Value) -> CanonicalEvent {
        let payload: Map<String, Value> = payload.as_object().cloned().unwrap();
        CanonicalEvent::new(exchange, event_type, payload)
    }

    #[test]
    fn tracks_quotes_from_both_exchanges() {
        let collector = collector();

        assert!(collector.observe(&event(
            Exchange::Binance,
            "24hrTicker",
            json!({"symbol": "BTCUSDT", "bestBidPrice": "100.5", "bestAskPrice": "101"}),
        )));
        assert!(collector.observe(&event(
            Exchange::HitBtc,
            "ticker",
            json!({"symbol": "BTCUSD", "bid": "100.1", "ask": "100.9"}),
        )));

        let record = collector.snapshot(&Currency::new("bitcoin")).unwrap();
        let titles: Vec<&str> = record.exchanges.iter().map(|q| q.title.as_str()).collect();
        assert_eq!(titles, vec!["binance", "hitbtc"]);
        assert_eq!(record.exchanges[0].bid, Decimal::from_str("100.5").unwrap());
        assert_eq!(record.exchanges[1].ask, Decimal::from_str("100.9").unwrap());
    }

    #[test]
    fn ignores_other_bases_and_bad_prices() {
        let collector = collector();

        assert!(!collector.observe(&event(
            Exchange::Binance,
            "24hrTicker",
            json!({"symbol": "ETHBTC", "bestBidPrice": "0.03", "bestAskPrice": "0.031"}),
        )));
        assert!(!collector.observe(&event(
            Exchange::HitBtc,
            "ticker",
            json!({"symbol": "ETHUSD", "bid": null, "ask": "2000"}),
        )));
        assert!(!collector.observe(&event(
            Exchange::Binance,
            "trade",
            json!({"symbol": "ETHUSDT", "price": "2000"}),
        )));

        assert!(collector.snapshots().is_empty());
    }

    #[test]
    fn latest_quote_wins() {
        let collector = collector();
        for bid in ["1", "2"] {
            collector.observe(&event(
                Exchange::HitBtc,
                "ticker",
                json!({"symbol": "ETHUSD", "bid": bid, "ask": "3"}),
            ));
        }

        let record = collector.snapshot(&Currency::new("ethereum")).unwrap();
        assert_eq!(record.exchanges.len(), 1);
        assert_eq!(record.exchanges[0].bid, Decimal::from(2));
    }

    #[tokio::test]
    async fn flush_stores_every_product_and_skips_failures() {
        let collector = collector();
        collector.observe(&event(
            Exchange::HitBtc,
            "ticker",
            json!({"symbol": "ETHUSD", "bid": "1", "ask": "2"}),
        ));
        collector.observe(&event(
            Exchange::HitBtc,
            "ticker",
            json!({"symbol": "BTCUSD", "bid": "3", "ask": "4"}),
        ));

        let mut sink = MockStatisticSink::new();
        sink.expect_store()
            .withf(|record| record.product.as_str() == "bitcoin")
            .times(1)
            .returning(|_| {
                Err(SinkError::Unavailable {
                    message: "down".to_string(),
                })
            });
        sink.expect_store()
            .withf(|record| record.product.as_str() == "ethereum")
            .times(1)
            .returning(|_| Ok(()));

        assert_eq!(collector.flush(&sink).await, 1);
    }

    #[tokio::test]
    async fn background_tasks_observe_and_flush() {
        use crate::application::services::EventBus;
        use crate::infrastructure::persistence::InMemoryStatisticSink;

        let collector = Arc::new(collector());
        let sink = Arc::new(InMemoryStatisticSink::default());
        let bus = EventBus::<CanonicalEvent>::new(16);
        let cancel = CancellationToken::new();

        let observer = tokio::spawn(
            Arc::clone(&collector).observe_events(bus.subscribe_all(), cancel.clone()),
        );
        let flusher = tokio::spawn(Arc::clone(&collector).flush_every(
            sink.clone(),
            Duration::from_millis(10),
            cancel.clone(),
        ));

        bus.publish(
            "ticker",
            event(
                Exchange::HitBtc,
                "ticker",
                json!({"symbol": "BTCUSD", "bid": "3", "ask": "4"}),
            ),
        );
        tokio::time::timeout(Duration::from_secs(5), async {
            while sink.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        observer.await.unwrap();
        flusher.await.unwrap();

        assert_eq!(sink.records()[0].product, Currency::new("bitcoin"));
    }

    #[tokio::test]
    async fn zero_flush_interval_does_not_panic() {
        use crate::infrastructure::persistence::InMemoryStatisticSink;

        let collector = Arc::new(collector());
        let sink = Arc::new(InMemoryStatisticSink::default());
        let cancel = CancellationToken::new();

        let flusher = tokio::spawn(Arc::clone(&collector).flush_every(
            sink,
            Duration::ZERO,
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        flusher.await.unwrap();
    }
}
