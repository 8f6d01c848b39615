//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Dialer`: opens a framed transport to an exchange endpoint
//! - `StatisticSink`: stores statistic snapshots
//! - `RestApi`: signed request/response calls to an exchange REST API
//!
//! ## Lifecycle
//!
//! - `SocketLifecycle`: start/stop/state shared by long-lived connections

mod lifecycle;
mod rest_api;
mod statistic_sink;
mod transport;

pub use lifecycle::SocketLifecycle;
pub use rest_api::{ApiAccess, ApiRequest, HttpMethod, RestApi, RestError};
#[cfg(test)]
pub use statistic_sink::MockStatisticSink;
pub use statistic_sink::{SinkError, StatisticSink};
pub use transport::{Dialer, Frame, FrameSink, FrameStream, TransportError};
