//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, exchange feed reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness check (simple OK)
//! - `GET /readyz` - Readiness check (checks exchange connections)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::domain::streaming::ConnectionState;
use crate::infrastructure::distribution::DistributionServer;
use crate::infrastructure::exchange::{FeedSnapshot, FeedState};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Relay version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Exchange feed status.
    pub feeds: Vec<FeedSnapshot>,
    /// Registered distribution clients.
    pub clients: usize,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every exchange feed is connected.
    Healthy,
    /// Some feeds are connected.
    Degraded,
    /// No feed is connected.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    feeds: Vec<Arc<FeedState>>,
    distribution: Arc<DistributionServer>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        feeds: Vec<Arc<FeedState>>,
        distribution: Arc<DistributionServer>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            feeds,
            distribution,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Routes served by the health server.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let is_ready = state
        .feeds
        .iter()
        .any(|feed| feed.state() == ConnectionState::Connected);

    if is_ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feeds: Vec<FeedSnapshot> = state.feeds.iter().map(|feed| feed.snapshot()).collect();

    HealthResponse {
        status: determine_health_status(&feeds),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feeds,
        clients: state.distribution.client_count(),
    }
}

fn determine_health_status(feeds: &[FeedSnapshot]) -> HealthStatus {
    let connected = feeds
        .iter()
        .filter(|feed| feed.state == ConnectionState::Connected)
        .count();

    match connected {
        0 => HealthStatus::Unhealthy,
        n if n == feeds.len() => HealthStatus::Healthy,
        _ => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::domain::streaming::Exchange;

    fn state_with(feeds: &[(Exchange, ConnectionState)]) -> Arc<HealthServerState> {
        let feeds = feeds
            .iter()
            .map(|&(exchange, connection)| {
                let feed = Arc::new(FeedState::new(exchange));
                feed.set_state(connection);
                feed
            })
            .collect();
        Arc::new(HealthServerState::new(
            "test".to_string(),
            feeds,
            Arc::new(DistributionServer::new()),
        ))
    }

    async fn get_status(state: Arc<HealthServerState>, path: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_connected_feeds() {
        let snapshot = |state| {
            let feed = FeedState::new(Exchange::Binance);
            feed.set_state(state);
            feed.snapshot()
        };
        let up = snapshot(ConnectionState::Connected);
        let down = snapshot(ConnectionState::Reconnecting);

        assert_eq!(determine_health_status(&[up.clone(), up.clone()]), HealthStatus::Healthy);
        assert_eq!(determine_health_status(&[up, down.clone()]), HealthStatus::Degraded);
        assert_eq!(determine_health_status(&[down]), HealthStatus::Unhealthy);
        assert_eq!(determine_health_status(&[]), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = get_status(state_with(&[]), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn readiness_needs_one_connected_feed() {
        let state = state_with(&[
            (Exchange::Binance, ConnectionState::Connected),
            (Exchange::HitBtc, ConnectionState::Connecting),
        ]);
        let (status, body) = get_status(state, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");

        let state = state_with(&[(Exchange::Binance, ConnectionState::Reconnecting)]);
        let (status, _) = get_status(state, "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn health_reports_feeds_and_clients() {
        let state = state_with(&[
            (Exchange::Binance, ConnectionState::Connected),
            (Exchange::HitBtc, ConnectionState::Disconnected),
        ]);
        let (status, body) = get_status(state, "/health").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["clients"], 0);
        assert_eq!(json["feeds"][0]["exchange"], "binance");
        assert_eq!(json["feeds"][0]["state"], "connected");
        assert_eq!(json["feeds"][1]["state"], "disconnected");
    }

    #[tokio::test]
    async fn unhealthy_returns_service_unavailable() {
        let state = state_with(&[(Exchange::HitBtc, ConnectionState::Reconnecting)]);
        let (status, _) = get_status(state, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
