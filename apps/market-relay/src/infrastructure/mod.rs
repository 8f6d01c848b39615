//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Exchange WebSocket connectors, wire protocols and transport.
pub mod exchange;

/// Downstream WebSocket distribution server.
pub mod distribution;

/// Configuration loaded from the environment.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// In-memory statistic sink.
pub mod persistence;

/// REST payload canonicalization and signing.
pub mod rest;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
