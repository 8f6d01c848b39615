//! Prometheus Metrics Module
//!
//! Exposes relay metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Exchange frames**: received, undecodable, exchange-reported errors
//! - **Events**: canonical events published and events without a mapping
//! - **Connections**: exchange connection state, reconnects, client count
//! - **Distribution**: broadcast deliveries and skipped transports
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::streaming::{ConnectionState, Exchange};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls return the first handle.
///
/// # Errors
///
/// Returns `BuildError` if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "relay_frames_received_total",
        "Text frames received from exchange feeds"
    );
    describe_counter!(
        "relay_parse_errors_total",
        "Exchange frames dropped because they could not be decoded"
    );
    describe_counter!(
        "relay_protocol_errors_total",
        "Error responses reported by exchanges"
    );
    describe_counter!(
        "relay_events_published_total",
        "Canonical events published on connector buses"
    );
    describe_counter!(
        "relay_events_unmapped_total",
        "Exchange events dropped because their type has no mapping"
    );

    describe_gauge!(
        "relay_exchange_connected",
        "1 when the exchange connection is open, 0 otherwise"
    );
    describe_counter!(
        "relay_reconnects_total",
        "Exchange reconnections"
    );

    describe_gauge!("relay_clients", "Registered distribution clients");
    describe_counter!(
        "relay_broadcast_delivered_total",
        "Broadcast envelopes written to client transports"
    );
    describe_counter!(
        "relay_broadcast_skipped_total",
        "Broadcast targets skipped because their transport was closed"
    );
    describe_counter!(
        "relay_broadcast_failed_total",
        "Broadcast sends rejected by a full or closing client queue"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a text frame received from an exchange.
pub fn record_frame_received(exchange: Exchange) {
    counter!("relay_frames_received_total", "exchange" => exchange.as_str()).increment(1);
}

/// Record a frame that failed to decode.
pub fn record_parse_error(exchange: Exchange) {
    counter!("relay_parse_errors_total", "exchange" => exchange.as_str()).increment(1);
}

/// Record an exchange-reported error.
pub fn record_protocol_error(exchange: Exchange) {
    counter!("relay_protocol_errors_total", "exchange" => exchange.as_str()).increment(1);
}

/// Record a canonical event published on the bus.
pub fn record_event_published(exchange: Exchange, event_type: &str) {
    counter!(
        "relay_events_published_total",
        "exchange" => exchange.as_str(),
        "event_type" => event_type.to_string()
    )
    .increment(1);
}

/// Record an event dropped for lack of a mapping.
pub fn record_event_unmapped(exchange: Exchange, event_type: &str) {
    counter!(
        "relay_events_unmapped_total",
        "exchange" => exchange.as_str(),
        "event_type" => event_type.to_string()
    )
    .increment(1);
}

/// Update the connection gauge of an exchange.
pub fn set_connection_state(exchange: Exchange, state: ConnectionState) {
    let connected = if state == ConnectionState::Connected { 1.0 } else { 0.0 };
    gauge!("relay_exchange_connected", "exchange" => exchange.as_str()).set(connected);
}

/// Record a reconnection.
pub fn record_reconnect(exchange: Exchange) {
    counter!("relay_reconnects_total", "exchange" => exchange.as_str()).increment(1);
}

/// Update the registered client count.
pub fn set_clients(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("relay_clients").set(count as f64);
}

/// Record the outcome of one broadcast.
pub fn record_broadcast(method: &str, delivered: usize, skipped: usize, failed: usize) {
    counter!("relay_broadcast_delivered_total", "method" => method.to_string())
        .increment(delivered as u64);
    counter!("relay_broadcast_skipped_total", "method" => method.to_string())
        .increment(skipped as u64);
    counter!("relay_broadcast_failed_total", "method" => method.to_string())
        .increment(failed as u64);
}
