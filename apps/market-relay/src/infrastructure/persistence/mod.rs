//! Statistic Persistence
//!
//! In-memory [`StatisticSink`] holding the most recent records. Durable
//! storage lives behind the same port outside this service.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{SinkError, StatisticSink};
use crate::domain::instrument::Currency;
use crate::domain::statistic::StatisticRecord;

/// Default number of retained records.
pub const DEFAULT_RETAINED_RECORDS: usize = 10_000;

/// Bounded in-memory record store. The oldest record is evicted first.
#[derive(Debug)]
pub struct InMemoryStatisticSink {
    capacity: usize,
    records: RwLock<VecDeque<StatisticRecord>>,
}

impl Default for InMemoryStatisticSink {
    fn default() -> Self {
        Self::new(DEFAULT_RETAINED_RECORDS)
    }
}

impl InMemoryStatisticSink {
    /// Store retaining at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: RwLock::new(VecDeque::new()),
        }
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether nothing is retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<StatisticRecord> {
        self.records.read().iter().cloned().collect()
    }

    /// Most recent record for `product`.
    #[must_use]
    pub fn latest(&self, product: &Currency) -> Option<StatisticRecord> {
        self.records
            .read()
            .iter()
            .rev()
            .find(|record| &record.product == product)
            .cloned()
    }
}

#[async_trait]
impl StatisticSink for InMemoryStatisticSink {
    async fn store(&self, record: StatisticRecord) -> Result<(), SinkError> {
        if self.capacity == 0 {
            return Err(SinkError::Unavailable {
                message: "in-memory sink has no capacity".to_string(),
            });
        }

        let mut records = self.records.write();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        tracing::debug!(
            product = %record.product,
            exchanges = record.exchanges.len(),
            spread = ?record.max_spread(),
            "Statistic stored"
        );
        records.push_back(record);
        Ok(())
    }
}
