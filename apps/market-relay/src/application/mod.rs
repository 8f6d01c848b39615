//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the relay interacts with exchanges, clients and
//! external collaborators.

/// Port interfaces for external systems (transports, sinks, REST).
pub mod ports;

/// Application services for event fan-out and statistics.
pub mod services;
