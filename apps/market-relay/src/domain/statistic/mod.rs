//! Statistic Records
//!
//! Point-in-time best bid/ask of one product across exchanges, as handed to
//! the persistence sink.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::instrument::Currency;

/// Best quote of one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeQuote {
    /// Exchange name.
    pub title: String,
    /// Best bid price.
    pub bid: Decimal,
    /// Best ask price.
    pub ask: Decimal,
}

/// Snapshot of a product's quotes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticRecord {
    /// Product the quotes refer to.
    pub product: Currency,
    /// Snapshot time.
    pub created_at: DateTime<Utc>,
    /// One quote per exchange.
    pub exchanges: Vec<ExchangeQuote>,
}

impl StatisticRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn now(product: Currency, exchanges: Vec<ExchangeQuote>) -> Self {
        Self {
            product,
            created_at: Utc::now(),
            exchanges,
        }
    }

    /// Widest ask-minus-bid spread across exchanges, if any quote exists.
    #[must_use]
    pub fn max_spread(&self) -> Option<Decimal> {
        self.exchanges.iter().map(|q| q.ask - q.bid).max()
    }
}
