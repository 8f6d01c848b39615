//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `EventBus`: named-channel fan-out of events inside a component
//! - `StatisticCollector`: best bid/ask tracking and periodic snapshots

mod event_bus;
mod statistics;

pub use event_bus::{EventBus, EventBusStats};
pub use statistics::StatisticCollector;
