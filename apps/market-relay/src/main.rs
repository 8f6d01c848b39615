//! Market Relay Binary
//!
//! Starts the exchange connectors, the distribution server and the health
//! server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-relay
//! ```
//!
//! # Environment Variables
//!
//! - `RELAY_EXCHANGES`: Enabled exchanges (default: binance,hitbtc)
//! - `RELAY_PRODUCTS` / `RELAY_BASES`: Instrument currencies
//! - `RELAY_BINANCE_EVENTS` / `RELAY_HITBTC_EVENTS`: Streamed events (default: ticker)
//! - `BINANCE_WS_URL` / `HITBTC_WS_URL`: Stream endpoint overrides
//! - `RELAY_SYMBOLS_BINANCE` / `RELAY_SYMBOLS_HITBTC`: Symbol overrides (`currency=SYMBOL,...`)
//! - `RELAY_DISTRIBUTION_PORT`: Client WebSocket port (default: 3301)
//! - `RELAY_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `RELAY_RECONNECT_DELAY_MS`: Redial delay (default: 0)
//! - `RELAY_RECONNECT_MAX_DELAY_MS`: Backoff ceiling, enables doubling when above the delay
//! - `RELAY_LAZY_START`: Connect on first subscription (default: false)
//! - `RELAY_BUS_CAPACITY`: Per-channel event buffer (default: 4096)
//! - `RELAY_STATISTICS_INTERVAL_SECS`: Statistic flush interval (default: 60)
//! - `RELAY_STATISTICS_BASE`: Quote currency for statistics (default: tether)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_relay::application::ports::{Dialer, SocketLifecycle};
use market_relay::infrastructure::config::ExchangeSettings;
use market_relay::infrastructure::persistence::InMemoryStatisticSink;
use market_relay::{
    BinanceProtocol, ConnectorConfig, DistributionServer, Exchange, ExchangeConnector,
    ExchangeProtocol, HealthServer, HealthServerState, HitBtcProtocol, RelayConfig,
    StatisticCollector, TungsteniteDialer, init_metrics, init_telemetry,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = init_telemetry().context("Failed to initialize telemetry")?;

    tracing::info!("Starting Market Relay");

    let _metrics_handle = init_metrics().context("Failed to install Prometheus recorder")?;

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Exchange connectors
    let dialer: Arc<dyn Dialer> = Arc::new(TungsteniteDialer::new());
    let mut connectors = Vec::with_capacity(config.exchanges.len());
    for settings in &config.exchanges {
        let protocol = protocol_for(settings);
        let topics = protocol
            .build_topics(
                &config.instruments.products,
                &config.instruments.bases,
                &settings.events,
            )
            .with_context(|| format!("Failed to build {} topics", settings.exchange))?;

        tracing::info!(
            exchange = %settings.exchange,
            topics = ?topics.keys(),
            "Topics built"
        );

        let connector_config = ConnectorConfig {
            url: settings.url.clone(),
            reconnect: config.stream.reconnect.clone(),
            lazy_start: config.stream.lazy_start,
            bus_capacity: config.stream.bus_capacity,
        };
        connectors.push(Arc::new(ExchangeConnector::new(
            protocol,
            Arc::clone(&dialer),
            topics,
            connector_config,
        )));
    }

    // Distribution server, fed by every connector's firehose
    let distribution = Arc::new(DistributionServer::new());
    for connector in &connectors {
        tokio::spawn(
            Arc::clone(&distribution).forward(connector.subscribe_all(), shutdown_token.clone()),
        );
    }

    // Statistic collection
    let topics: HashMap<Exchange, _> = connectors
        .iter()
        .map(|c| (c.exchange(), c.topics()))
        .collect();
    let collector = Arc::new(StatisticCollector::new(
        config.statistics.base.clone(),
        topics,
    ));
    for connector in &connectors {
        tokio::spawn(
            Arc::clone(&collector)
                .observe_events(connector.bus().subscribe_all(), shutdown_token.clone()),
        );
    }
    tokio::spawn(Arc::clone(&collector).flush_every(
        Arc::new(InMemoryStatisticSink::default()),
        config.statistics.interval,
        shutdown_token.clone(),
    ));

    if !config.stream.lazy_start {
        for connector in &connectors {
            Arc::clone(connector).start();
        }
    }

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        connectors.iter().map(|c| c.feed_state()).collect(),
        Arc::clone(&distribution),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Distribution server
    let distribution_port = config.server.distribution_port;
    let distribution_shutdown = shutdown_token.clone();
    let distribution_task = tokio::spawn(async move {
        if let Err(e) = distribution
            .run(distribution_port, distribution_shutdown)
            .await
        {
            tracing::error!(error = %e, "Distribution server error");
        }
    });

    tracing::info!("Market relay ready");

    await_shutdown(shutdown_token).await;

    let stop_all = async {
        for connector in &connectors {
            connector.stop().await;
        }
        let _ = distribution_task.await;
    };
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, stop_all).await.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Shutdown timed out"
        );
    }

    tracing::info!("Market relay stopped");
    Ok(())
}

/// Wire protocol for an exchange, with its configured symbol overrides.
fn protocol_for(settings: &ExchangeSettings) -> Arc<dyn ExchangeProtocol> {
    match settings.exchange {
        Exchange::Binance => Arc::new(BinanceProtocol::with_symbols(&settings.symbols)),
        Exchange::HitBtc => Arc::new(HitBtcProtocol::with_symbols(&settings.symbols)),
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        exchanges = ?config.exchanges.iter().map(|e| e.exchange.as_str()).collect::<Vec<_>>(),
        products = ?config.instruments.products,
        bases = ?config.instruments.bases,
        distribution_port = config.server.distribution_port,
        health_port = config.server.health_port,
        lazy_start = config.stream.lazy_start,
        "Configuration loaded"
    );
    for settings in &config.exchanges {
        tracing::debug!(
            exchange = %settings.exchange,
            url = %settings.url,
            events = ?settings.events,
            "Exchange endpoint"
        );
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
