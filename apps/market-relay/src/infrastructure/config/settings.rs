//! Relay Configuration Settings
//!
//! Configuration types for the relay, loaded from environment variables.

use std::time::Duration;

use crate::domain::instrument::{Currency, SymbolTable};
use crate::domain::streaming::Exchange;
use crate::infrastructure::exchange::{BINANCE_STREAM_URL, HITBTC_STREAM_URL, ReconnectConfig};

/// Streaming settings of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeSettings {
    /// Exchange to stream from.
    pub exchange: Exchange,
    /// Base WebSocket URL.
    pub url: String,
    /// Event names to subscribe to (`ticker`, `trade`, ...).
    pub events: Vec<String>,
    /// Wire symbol overrides for this exchange.
    pub symbols: SymbolTable,
}

impl ExchangeSettings {
    /// Production settings for `exchange`, streaming tickers.
    #[must_use]
    pub fn defaults_for(exchange: Exchange) -> Self {
        let url = match exchange {
            Exchange::Binance => BINANCE_STREAM_URL,
            Exchange::HitBtc => HITBTC_STREAM_URL,
        };
        Self {
            exchange,
            url: url.to_string(),
            events: vec!["ticker".to_string()],
            symbols: SymbolTable::new(),
        }
    }
}

/// Instruments every exchange streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentSettings {
    /// Product currencies (outer loop of the topic builder).
    pub products: Vec<Currency>,
    /// Base currencies (inner loop).
    pub bases: Vec<Currency>,
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            products: vec![Currency::new("bitcoin"), Currency::new("ethereum")],
            bases: vec![Currency::new("bitcoin"), Currency::new("tether")],
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Distribution WebSocket port.
    pub distribution_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            distribution_port: 3301,
            health_port: 8083,
        }
    }
}

/// Exchange stream settings shared by all connectors.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Redial delay policy.
    pub reconnect: ReconnectConfig,
    /// Connect on first subscription instead of at startup.
    pub lazy_start: bool,
    /// Per-channel event buffer.
    pub bus_capacity: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::immediate(),
            lazy_start: false,
            bus_capacity: 4096,
        }
    }
}

/// Statistic collection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticsSettings {
    /// Flush interval.
    pub interval: Duration,
    /// Quote currency compared across exchanges.
    pub base: Currency,
}

impl Default for StatisticsSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            base: Currency::new("tether"),
        }
    }
}

/// Complete relay configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Enabled exchanges.
    pub exchanges: Vec<ExchangeSettings>,
    /// Streamed instruments.
    pub instruments: InstrumentSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Exchange stream settings.
    pub stream: StreamSettings,
    /// Statistic collection settings.
    pub statistics: StatisticsSettings,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            exchanges: vec![
                ExchangeSettings::defaults_for(Exchange::Binance),
                ExchangeSettings::defaults_for(Exchange::HitBtc),
            ],
            instruments: InstrumentSettings::default(),
            server: ServerSettings::default(),
            stream: StreamSettings::default(),
            statistics: StatisticsSettings::default(),
        }
    }
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a list variable is empty or names something
    /// unknown, or if a symbol override is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`RelayConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = &lookup;

        let exchanges = match lookup("RELAY_EXCHANGES") {
            Some(value) => parse_exchanges(&value)?,
            None => vec![Exchange::Binance, Exchange::HitBtc],
        };
        let exchanges = exchanges
            .into_iter()
            .map(|exchange| exchange_settings(lookup, exchange))
            .collect::<Result<Vec<_>, _>>()?;

        let defaults = InstrumentSettings::default();
        let instruments = InstrumentSettings {
            products: parse_currency_list(lookup, "RELAY_PRODUCTS", defaults.products)?,
            bases: parse_currency_list(lookup, "RELAY_BASES", defaults.bases)?,
        };

        let server = ServerSettings {
            distribution_port: parse_env(
                lookup,
                "RELAY_DISTRIBUTION_PORT",
                ServerSettings::default().distribution_port,
            ),
            health_port: parse_env(
                lookup,
                "RELAY_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        let reconnect_delay = parse_env_duration_millis(lookup, "RELAY_RECONNECT_DELAY_MS", Duration::ZERO);
        let reconnect_max = parse_env_duration_millis(lookup, "RELAY_RECONNECT_MAX_DELAY_MS", reconnect_delay);
        let reconnect = if reconnect_delay.is_zero() {
            ReconnectConfig::immediate()
        } else if reconnect_max > reconnect_delay {
            ReconnectConfig::backoff(reconnect_delay, reconnect_max, 2.0)
        } else {
            ReconnectConfig::fixed(reconnect_delay)
        };

        let stream = StreamSettings {
            reconnect,
            lazy_start: parse_env_bool(lookup, "RELAY_LAZY_START", StreamSettings::default().lazy_start),
            bus_capacity: require_non_zero(
                "RELAY_BUS_CAPACITY",
                parse_env(lookup, "RELAY_BUS_CAPACITY", StreamSettings::default().bus_capacity),
            )?,
        };

        let statistics = StatisticsSettings {
            interval: require_non_zero(
                "RELAY_STATISTICS_INTERVAL_SECS",
                parse_env_duration_secs(
                    lookup,
                    "RELAY_STATISTICS_INTERVAL_SECS",
                    StatisticsSettings::default().interval,
                ),
            )?,
            base: lookup("RELAY_STATISTICS_BASE")
                .filter(|v| !v.trim().is_empty())
                .map_or_else(|| StatisticsSettings::default().base, |v| Currency::new(&v)),
        };

        Ok(Self {
            exchanges,
            instruments,
            server,
            stream,
            statistics,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Exchange name is not supported.
    #[error("unknown exchange in RELAY_EXCHANGES: {0}")]
    UnknownExchange(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Parse failure.
        message: String,
    },
}

fn exchange_settings(
    lookup: &impl Fn(&str) -> Option<String>,
    exchange: Exchange,
) -> Result<ExchangeSettings, ConfigError> {
    let defaults = ExchangeSettings::defaults_for(exchange);
    let (url_key, events_key, symbols_key) = match exchange {
        Exchange::Binance => ("BINANCE_WS_URL", "RELAY_BINANCE_EVENTS", "RELAY_SYMBOLS_BINANCE"),
        Exchange::HitBtc => ("HITBTC_WS_URL", "RELAY_HITBTC_EVENTS", "RELAY_SYMBOLS_HITBTC"),
    };

    let url = lookup(url_key)
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(defaults.url);

    let events = match lookup(events_key) {
        Some(value) => {
            let events = split_list(&value);
            if events.is_empty() {
                return Err(ConfigError::EmptyValue(events_key.to_string()));
            }
            events
        }
        None => defaults.events,
    };

    let symbols = match lookup(symbols_key) {
        Some(value) => SymbolTable::parse(&value).map_err(|e| ConfigError::InvalidValue {
            key: symbols_key.to_string(),
            message: e.to_string(),
        })?,
        None => defaults.symbols,
    };

    Ok(ExchangeSettings {
        exchange,
        url,
        events,
        symbols,
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_exchanges(value: &str) -> Result<Vec<Exchange>, ConfigError> {
    let mut exchanges = Vec::new();
    for name in split_list(value) {
        let exchange = Exchange::from_str_case_insensitive(&name)
            .ok_or(ConfigError::UnknownExchange(name))?;
        if !exchanges.contains(&exchange) {
            exchanges.push(exchange);
        }
    }
    if exchanges.is_empty() {
        return Err(ConfigError::EmptyValue("RELAY_EXCHANGES".to_string()));
    }
    Ok(exchanges)
}

fn parse_currency_list(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Vec<Currency>,
) -> Result<Vec<Currency>, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    let currencies: Vec<Currency> = split_list(&value).iter().map(|c| Currency::new(c)).collect();
    if currencies.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }
    Ok(currencies)
}

fn parse_env<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key).map_or(default, |v| {
        matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

/// Timer periods and channel capacities panic at zero.
fn require_non_zero<T: PartialEq + Default>(key: &str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

fn parse_env_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<RelayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        RelayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, RelayConfig::default());
        assert_eq!(config.exchanges.len(), 2);
        assert_eq!(config.exchanges[0].url, BINANCE_STREAM_URL);
        assert_eq!(config.exchanges[1].url, HITBTC_STREAM_URL);
        assert_eq!(config.server.distribution_port, 3301);
        assert_eq!(config.server.health_port, 8083);
        assert_eq!(config.stream.reconnect, ReconnectConfig::immediate());
        assert!(!config.stream.lazy_start);
        assert_eq!(config.statistics.base, Currency::new("tether"));
    }

    #[test]
    fn exchange_list_and_overrides() {
        let config = config_from(&[
            ("RELAY_EXCHANGES", "HitBTC, hitbtc"),
            ("HITBTC_WS_URL", "ws://localhost:9000"),
            ("RELAY_HITBTC_EVENTS", "ticker,trades"),
            ("RELAY_SYMBOLS_HITBTC", "bitcoin-cash=BCHABC"),
        ])
        .unwrap();

        assert_eq!(config.exchanges.len(), 1);
        let hitbtc = &config.exchanges[0];
        assert_eq!(hitbtc.exchange, Exchange::HitBtc);
        assert_eq!(hitbtc.url, "ws://localhost:9000");
        assert_eq!(hitbtc.events, vec!["ticker", "trades"]);
        assert_eq!(hitbtc.symbols.get(&"bitcoin-cash".into()), Some("BCHABC"));
    }

    #[test]
    fn instruments_and_ports() {
        let config = config_from(&[
            ("RELAY_PRODUCTS", "Litecoin, ethereum"),
            ("RELAY_BASES", "bitcoin"),
            ("RELAY_DISTRIBUTION_PORT", "4000"),
            ("RELAY_HEALTH_PORT", "not a port"),
            ("RELAY_LAZY_START", "true"),
            ("RELAY_STATISTICS_INTERVAL_SECS", "5"),
        ])
        .unwrap();

        assert_eq!(
            config.instruments.products,
            vec![Currency::new("litecoin"), Currency::new("ethereum")]
        );
        assert_eq!(config.instruments.bases, vec![Currency::new("bitcoin")]);
        assert_eq!(config.server.distribution_port, 4000);
        assert_eq!(config.server.health_port, 8083);
        assert!(config.stream.lazy_start);
        assert_eq!(config.statistics.interval, Duration::from_secs(5));
    }

    #[test]
    fn reconnect_delay_variants() {
        let fixed = config_from(&[("RELAY_RECONNECT_DELAY_MS", "250")]).unwrap();
        assert_eq!(
            fixed.stream.reconnect,
            ReconnectConfig::fixed(Duration::from_millis(250))
        );

        let backoff = config_from(&[
            ("RELAY_RECONNECT_DELAY_MS", "250"),
            ("RELAY_RECONNECT_MAX_DELAY_MS", "8000"),
        ])
        .unwrap();
        assert_eq!(
            backoff.stream.reconnect,
            ReconnectConfig::backoff(Duration::from_millis(250), Duration::from_secs(8), 2.0)
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert_eq!(
            config_from(&[("RELAY_EXCHANGES", "binance,kraken")]),
            Err(ConfigError::UnknownExchange("kraken".to_string()))
        );
        assert_eq!(
            config_from(&[("RELAY_EXCHANGES", " , ")]),
            Err(ConfigError::EmptyValue("RELAY_EXCHANGES".to_string()))
        );
        assert_eq!(
            config_from(&[("RELAY_PRODUCTS", "")]),
            Err(ConfigError::EmptyValue("RELAY_PRODUCTS".to_string()))
        );
        assert!(matches!(
            config_from(&[("RELAY_SYMBOLS_BINANCE", "tether")]),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn zero_interval_and_capacity_are_rejected() {
        assert_eq!(
            config_from(&[("RELAY_STATISTICS_INTERVAL_SECS", "0")]),
            Err(ConfigError::InvalidValue {
                key: "RELAY_STATISTICS_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            })
        );
        assert!(matches!(
            config_from(&[("RELAY_BUS_CAPACITY", "0")]),
            Err(ConfigError::InvalidValue { key, .. }) if key == "RELAY_BUS_CAPACITY"
        ));
        assert_eq!(
            config_from(&[("RELAY_STATISTICS_INTERVAL_SECS", "1")])
                .unwrap()
                .statistics
                .interval,
            Duration::from_secs(1)
        );
    }
}
