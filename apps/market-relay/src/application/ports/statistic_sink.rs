//! Statistic Sink Port (Driven Port)
//!
//! Accepts statistic snapshots for storage. Nothing in the relay depends
//! on how the sink lays them out.

use async_trait::async_trait;

use crate::domain::statistic::StatisticRecord;

/// Sink errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// Storage backend unavailable.
    #[error("Statistic sink unavailable: {message}")]
    Unavailable { message: String },

    /// Record rejected by the backend.
    #[error("Statistic record rejected: {message}")]
    Rejected { message: String },
}

/// Port for persisting statistic records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatisticSink: Send + Sync {
    /// Store one record.
    async fn store(&self, record: StatisticRecord) -> Result<(), SinkError>;
}
