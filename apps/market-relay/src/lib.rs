#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Market Relay - Exchange Stream Normalizer
//!
//! Maintains WebSocket connections to crypto exchange market data feeds
//! (Binance, HitBTC), renames their compact wire fields into a canonical
//! schema and republishes the resulting events to downstream WebSocket
//! clients.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and transforms
//!   - `instrument`: Currencies, instruments, symbol tables
//!   - `topic`: Subscription topic construction
//!   - `mapping`: Recursive field renaming
//!   - `streaming`: Canonical events and connection states
//!   - `statistic`: Cross-exchange quote snapshots
//!
//! - **Application**: Ports and services
//!   - `ports`: Transport dialer, socket lifecycle, statistic sink, REST API
//!   - `services`: Event bus, statistic collector
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchange`: Exchange protocols and connectors
//!   - `distribution`: Downstream WebSocket server
//!   - `config`, `health`, `metrics`, `telemetry`, `persistence`, `rest`
//!
//! # Data Flow
//!
//! ```text
//! Binance WS ──► Connector ──┐
//!                            ├──► Event Bus ──► Distribution ──► Client 1..N
//! HitBTC WS  ──► Connector ──┘         │
//!                                      └──► Statistic Collector ──► Sink
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core relay types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::instrument::{Currency, Instrument, SymbolResolver, SymbolTable};
pub use domain::mapping::{FieldMapping, MappingEntry};
pub use domain::statistic::{ExchangeQuote, StatisticRecord};
pub use domain::streaming::{CanonicalEvent, ConnectionState, Exchange};
pub use domain::topic::{Topic, TopicBuilder, TopicError, TopicFormat, TopicSet};

// Application
pub use application::ports::{Dialer, Frame, SocketLifecycle, StatisticSink, TransportError};
pub use application::services::{EventBus, StatisticCollector};

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelayConfig};

// Exchange connectors
pub use infrastructure::exchange::{
    BinanceProtocol, ConnectorConfig, ExchangeConnector, ExchangeProtocol, HitBtcProtocol,
    SubscriptionAction, TungsteniteDialer,
};

// Distribution server (for integration tests)
pub use infrastructure::distribution::{ClientRequest, DeliveryReport, DistributionServer};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
